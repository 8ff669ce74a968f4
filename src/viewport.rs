// ------------------------- Viewport State -------------------------

use std::f64::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::palette::{self, Palette, Rgb};

const MIN_ZOOM: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// `zoom` stays strictly positive, `animation_speed` non-negative and
/// `paint_intensity` in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewportState {
    center: Complex,
    zoom: f64,
    julia_c: Complex,
    is_julia: bool,
    color_shift: f64,
    animation_speed: f64,
    colors: [Rgb; 3],
    #[serde(skip)]
    paint_seed: Complex,
    #[serde(skip)]
    paint_intensity: f64,
    auto_evolve: bool,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            center: Complex::new(-0.75, 0.0),
            zoom: 0.8,
            julia_c: Complex::new(-0.7, 0.270_15),
            is_julia: false,
            color_shift: 0.0,
            animation_speed: 1.0,
            colors: palette::default_palette().colors,
            paint_seed: Complex::new(0.0, 0.0),
            paint_intensity: 0.0,
            auto_evolve: false,
        }
    }
}

impl ViewportState {
    pub fn center(&self) -> Complex {
        self.center
    }

    pub fn set_center(&mut self, center: Complex) {
        if center.re.is_finite() && center.im.is_finite() {
            self.center = center;
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom.max(MIN_ZOOM);
        }
    }

    pub fn scale_zoom(&mut self, factor: f64) {
        self.set_zoom(self.zoom * factor);
    }

    pub fn julia_c(&self) -> Complex {
        self.julia_c
    }

    pub fn set_julia_c(&mut self, c: Complex) {
        if c.re.is_finite() && c.im.is_finite() {
            self.julia_c = c;
        }
    }

    pub fn is_julia(&self) -> bool {
        self.is_julia
    }

    pub fn set_is_julia(&mut self, is_julia: bool) {
        self.is_julia = is_julia;
    }

    pub fn color_shift(&self) -> f64 {
        self.color_shift
    }

    pub fn set_color_shift(&mut self, shift: f64) {
        if shift.is_finite() {
            self.color_shift = shift;
        }
    }

    pub fn animation_speed(&self) -> f64 {
        self.animation_speed
    }

    pub fn set_animation_speed(&mut self, speed: f64) {
        if speed.is_finite() {
            self.animation_speed = speed.max(0.0);
        }
    }

    pub fn colors(&self) -> [Rgb; 3] {
        self.colors
    }

    pub fn set_colors(&mut self, colors: [Rgb; 3]) {
        self.colors = colors.map(|c| c.map(|v| v.clamp(0.0, 1.0)));
    }

    pub fn auto_evolve(&self) -> bool {
        self.auto_evolve
    }

    pub fn set_auto_evolve(&mut self, enabled: bool) {
        self.auto_evolve = enabled;
    }

    pub fn paint_seed(&self) -> Complex {
        self.paint_seed
    }

    pub fn paint_intensity(&self) -> f64 {
        self.paint_intensity
    }

    /// Anchors the ripple at `seed` and strengthens it by `step`, saturating at 1.
    pub fn apply_paint(&mut self, seed: Complex, step: f64) -> f64 {
        self.paint_seed = seed;
        self.paint_intensity = (self.paint_intensity + step).clamp(0.0, 1.0);
        self.paint_intensity
    }

    pub fn decay_paint(&mut self, factor: f64) {
        self.paint_intensity = (self.paint_intensity * factor).clamp(0.0, 1.0);
    }

    pub fn nudge_center(&mut self, d_re: f64, d_im: f64) {
        self.set_center(Complex::new(self.center.re + d_re, self.center.im + d_im));
    }

    pub fn nudge_julia_c(&mut self, d_re: f64, d_im: f64) {
        self.set_julia_c(Complex::new(self.julia_c.re + d_re, self.julia_c.im + d_im));
    }

    pub fn apply_palette(&mut self, palette: &Palette) {
        self.set_colors(palette.colors);
    }

    /// Restores the session defaults, including the default palette. The paint
    /// ripple only ever fades, so it survives.
    pub fn reset(&mut self) {
        let (seed, intensity) = (self.paint_seed, self.paint_intensity);
        *self = Self::default();
        self.paint_seed = seed;
        self.paint_intensity = intensity;
    }

    /// Jumps to a random view and palette. Leaves `auto_evolve` and the paint
    /// ripple untouched; returns the palette that was picked.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &'static Palette {
        self.center = Complex::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        self.zoom = 10f64.powf(rng.gen_range(-1.0..2.0));
        self.julia_c = Complex::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        self.color_shift = rng.gen_range(0.0..TAU);
        self.animation_speed = rng.gen_range(0.5..2.0);
        self.is_julia = rng.gen_bool(0.5);
        let palette = palette::random_palette(rng);
        self.apply_palette(palette);
        palette
    }

    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !(self.zoom.is_finite() && self.zoom > 0.0) {
            self.zoom = defaults.zoom;
        }
        if !(self.center.re.is_finite() && self.center.im.is_finite()) {
            self.center = defaults.center;
        }
        if !(self.julia_c.re.is_finite() && self.julia_c.im.is_finite()) {
            self.julia_c = defaults.julia_c;
        }
        if !self.color_shift.is_finite() {
            self.color_shift = defaults.color_shift;
        }
        if !self.animation_speed.is_finite() || self.animation_speed < 0.0 {
            self.animation_speed = defaults.animation_speed;
        }
        let colors = self.colors;
        self.set_colors(colors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn defaults_match_session_start() {
        let state = ViewportState::default();
        assert_eq!(state.center(), Complex::new(-0.75, 0.0));
        assert!((state.zoom() - 0.8).abs() < 1e-12);
        assert_eq!(state.julia_c(), Complex::new(-0.7, 0.27015));
        assert!(!state.is_julia());
        assert_eq!(state.color_shift(), 0.0);
        assert_eq!(state.animation_speed(), 1.0);
        assert!(!state.auto_evolve());
        assert_eq!(state.paint_intensity(), 0.0);
        assert_eq!(state.colors(), palette::default_palette().colors);
    }

    #[test]
    fn zoom_rejects_non_positive_values() {
        let mut state = ViewportState::default();
        state.set_zoom(0.0);
        state.set_zoom(-3.0);
        state.set_zoom(f64::NAN);
        assert!((state.zoom() - 0.8).abs() < 1e-12);
        state.set_zoom(2.5);
        assert!((state.zoom() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn paint_intensity_saturates_and_decays() {
        let mut state = ViewportState::default();
        for _ in 0..15 {
            state.apply_paint(Complex::new(0.1, 0.2), 0.1);
        }
        assert!((state.paint_intensity() - 1.0).abs() < 1e-12);
        assert_eq!(state.paint_seed(), Complex::new(0.1, 0.2));

        let before = state.paint_intensity();
        state.decay_paint(0.98);
        assert!((state.paint_intensity() - before * 0.98).abs() < 1e-12);
    }

    #[test]
    fn animation_speed_is_never_negative() {
        let mut state = ViewportState::default();
        state.set_animation_speed(-1.0);
        assert_eq!(state.animation_speed(), 0.0);
    }

    #[test]
    fn randomize_keeps_invariants_and_auto_evolve() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = ViewportState::default();
        state.set_auto_evolve(true);
        for _ in 0..50 {
            let palette = state.randomize(&mut rng);
            assert_eq!(state.colors(), palette.colors);
            assert!(state.zoom() >= 0.1 && state.zoom() < 100.0);
            assert!(state.animation_speed() >= 0.5 && state.animation_speed() < 2.0);
            assert!(state.center().re.abs() <= 1.0 && state.center().im.abs() <= 1.0);
            assert!(state.auto_evolve());
        }
        state.reset();
        assert_eq!(state, ViewportState::default());
    }

    #[test]
    fn reset_keeps_paint_ripple() {
        let mut state = ViewportState::default();
        state.set_zoom(5.0);
        state.set_is_julia(true);
        state.set_auto_evolve(true);
        state.apply_paint(Complex::new(0.3, -0.2), 0.4);

        state.reset();
        assert_eq!(state.zoom(), ViewportState::default().zoom());
        assert!(!state.is_julia());
        assert!(!state.auto_evolve());
        assert_eq!(state.paint_seed(), Complex::new(0.3, -0.2));
        assert!((state.paint_intensity() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn sanitize_repairs_deserialized_garbage() {
        let mut state: ViewportState =
            serde_json::from_str(r#"{ "zoom": -4.0, "animation_speed": -2.0 }"#).expect("parse");
        state.sanitize();
        assert!((state.zoom() - 0.8).abs() < 1e-12);
        assert_eq!(state.animation_speed(), 1.0);
        assert_eq!(state.center(), Complex::new(-0.75, 0.0));
    }
}
