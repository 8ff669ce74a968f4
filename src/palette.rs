// ------------------------- Palettes -------------------------

use rand::Rng;

/// Linear RGB in `[0, 1]`.
pub type Rgb = [f32; 3];

/// A cyclic three-stop gradient.
#[derive(Debug)]
pub struct Palette {
    pub name: &'static str,
    pub description: &'static str,
    pub colors: [Rgb; 3],
}

const PALETTES: &[Palette] = &[
    Palette {
        name: "Electric Neon",
        description: "Default cyberpunk vibes",
        colors: [[0.0, 0.875, 1.0], [1.0, 0.173, 0.984], [0.557, 0.176, 0.886]],
    },
    Palette {
        name: "Fire Storm",
        description: "Burning flames and lava",
        colors: [[1.0, 0.2, 0.0], [1.0, 0.6, 0.0], [1.0, 1.0, 0.2]],
    },
    Palette {
        name: "Sunset Glow",
        description: "Golden hour magic",
        colors: [[0.4, 0.1, 0.6], [1.0, 0.4, 0.2], [1.0, 0.8, 0.3]],
    },
    Palette {
        name: "Ice Crystal",
        description: "Frozen crystal formations",
        colors: [[0.8, 0.9, 1.0], [0.6, 0.8, 1.0], [0.9, 0.95, 1.0]],
    },
    Palette {
        name: "Retro Miami",
        description: "80s synthwave vibes",
        colors: [[1.0, 0.1, 0.5], [0.1, 0.9, 1.0], [1.0, 0.8, 0.1]],
    },
    Palette {
        name: "Toxic Waste",
        description: "Radioactive glow",
        colors: [[0.5, 1.0, 0.1], [1.0, 1.0, 0.1], [0.1, 1.0, 0.5]],
    },
    Palette {
        name: "Royal Gold",
        description: "Luxury and elegance",
        colors: [[0.3, 0.1, 0.8], [1.0, 0.8, 0.1], [1.0, 0.9, 0.6]],
    },
];

pub fn palettes() -> &'static [Palette] {
    PALETTES
}

pub fn default_palette() -> &'static Palette {
    &PALETTES[0]
}

/// Case-insensitive lookup.
pub fn palette_by_name(name: &str) -> Option<&'static Palette> {
    PALETTES
        .iter()
        .find(|palette| palette.name.eq_ignore_ascii_case(name.trim()))
}

/// The catalog entry whose stops are exactly `colors`, if any.
pub fn palette_matching(colors: &[Rgb; 3]) -> Option<&'static Palette> {
    PALETTES.iter().find(|palette| palette.colors == *colors)
}

pub fn random_palette<R: Rng + ?Sized>(rng: &mut R) -> &'static Palette {
    &PALETTES[rng.gen_range(0..PALETTES.len())]
}
