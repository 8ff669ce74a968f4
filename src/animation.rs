// ------------------------- Animation Driver -------------------------

use std::time::{Duration, Instant};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

use crate::viewport::ViewportState;

pub const EVOLVE_PERIOD: Duration = Duration::from_millis(100);
pub const PAINT_DECAY: f64 = 0.98;

const CENTER_DRIFT: f64 = 0.005;
const JULIA_DRIFT: f64 = 0.005;
const ZOOM_JITTER: f64 = 0.02;
const COLOR_STEP: f64 = 0.05;
const MAX_CATCH_UP: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn start(now: Instant) -> Self {
        Self { start: now }
    }

    pub fn elapsed(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.start).as_secs_f64()
    }
}

/// One auto-evolve step: a small random walk of the view.
pub fn evolve_step<R: Rng + ?Sized>(state: &mut ViewportState, rng: &mut R) {
    state.nudge_center(
        rng.gen_range(-CENTER_DRIFT..=CENTER_DRIFT),
        rng.gen_range(-CENTER_DRIFT..=CENTER_DRIFT),
    );
    state.scale_zoom(rng.gen_range(1.0 - ZOOM_JITTER..=1.0 + ZOOM_JITTER));
    state.set_color_shift(state.color_shift() + COLOR_STEP);
    if state.is_julia() {
        state.nudge_julia_c(
            rng.gen_range(-JULIA_DRIFT..=JULIA_DRIFT),
            rng.gen_range(-JULIA_DRIFT..=JULIA_DRIFT),
        );
    }
}

#[derive(Debug, Clone)]
pub struct EvolveSchedule {
    period: Duration,
    next_due: Option<Instant>,
}

impl Default for EvolveSchedule {
    fn default() -> Self {
        Self::new(EVOLVE_PERIOD)
    }
}

impl EvolveSchedule {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn sync(&mut self, enabled: bool, now: Instant) {
        match (enabled, self.next_due) {
            (true, None) => self.next_due = Some(now + self.period),
            (false, Some(_)) => self.cancel(),
            _ => {}
        }
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    /// Runs every tick that came due by `now` and returns how many ran.
    pub fn poll<R: Rng + ?Sized>(
        &mut self,
        now: Instant,
        state: &mut ViewportState,
        rng: &mut R,
    ) -> u32 {
        let Some(mut due) = self.next_due else {
            return 0;
        };
        let mut ticks = 0;
        while due <= now {
            if ticks == MAX_CATCH_UP {
                debug!("auto-evolve fell behind, dropping missed ticks");
                due = now + self.period;
                break;
            }
            evolve_step(state, rng);
            ticks += 1;
            due += self.period;
        }
        self.next_due = Some(due);
        ticks
    }
}

/// Owns the session clock, the auto-evolve schedule and its randomness.
pub struct AnimationDriver<R = StdRng> {
    clock: SessionClock,
    schedule: EvolveSchedule,
    rng: R,
    stopped: bool,
}

impl AnimationDriver<StdRng> {
    pub fn new(now: Instant) -> Self {
        Self::with_rng(now, StdRng::from_entropy())
    }
}

impl<R: Rng> AnimationDriver<R> {
    pub fn with_rng(now: Instant, rng: R) -> Self {
        Self {
            clock: SessionClock::start(now),
            schedule: EvolveSchedule::default(),
            rng,
            stopped: false,
        }
    }

    pub fn elapsed(&self, now: Instant) -> f64 {
        self.clock.elapsed(now)
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    pub fn is_evolving(&self) -> bool {
        self.schedule.is_active()
    }

    /// Flips auto-evolve; turning it off cancels any pending tick before returning.
    pub fn set_auto_evolve(&mut self, state: &mut ViewportState, enabled: bool, now: Instant) {
        state.set_auto_evolve(enabled);
        if self.stopped {
            return;
        }
        self.schedule.sync(enabled, now);
        info!(enabled, "auto-evolve toggled");
    }

    /// Applies due auto-evolve ticks. Call once per frame, before the snapshot.
    pub fn tick(&mut self, state: &mut ViewportState, now: Instant) -> u32 {
        if self.stopped {
            return 0;
        }
        self.schedule.sync(state.auto_evolve(), now);
        self.schedule.poll(now, state, &mut self.rng)
    }

    // after the frame's snapshot was taken
    pub fn end_frame(&mut self, state: &mut ViewportState) {
        state.decay_paint(PAINT_DECAY);
    }

    pub fn stop(&mut self) {
        self.schedule.cancel();
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::Complex;

    fn driver(now: Instant) -> AnimationDriver<StdRng> {
        AnimationDriver::with_rng(now, StdRng::seed_from_u64(42))
    }

    #[test]
    fn ticks_stay_within_drift_bounds() {
        let start = Instant::now();
        let mut driver = driver(start);
        let mut state = ViewportState::default();
        let before = state.clone();
        driver.set_auto_evolve(&mut state, true, start);

        let n = 40;
        let mut now = start;
        let mut total = 0;
        for _ in 0..n {
            now += EVOLVE_PERIOD;
            total += driver.tick(&mut state, now);
        }
        assert_eq!(total, n);

        let n = f64::from(n);
        let c0 = before.center();
        let c1 = state.center();
        assert!((c1.re - c0.re).abs() <= CENTER_DRIFT * n + 1e-9);
        assert!((c1.im - c0.im).abs() <= CENTER_DRIFT * n + 1e-9);
        let ratio = state.zoom() / before.zoom();
        assert!(ratio >= 0.98f64.powf(n) - 1e-9 && ratio <= 1.02f64.powf(n) + 1e-9);
        assert!((state.color_shift() - COLOR_STEP * n).abs() < 1e-9);
        assert_eq!(state.julia_c(), before.julia_c());
    }

    #[test]
    fn julia_constant_drifts_only_in_julia_mode() {
        let start = Instant::now();
        let mut driver = driver(start);
        let mut state = ViewportState::default();
        state.set_is_julia(true);
        driver.set_auto_evolve(&mut state, true, start);
        driver.tick(&mut state, start + EVOLVE_PERIOD * 5);
        let c = state.julia_c();
        assert_ne!(c, Complex::new(-0.7, 0.27015));
        assert!((c.re - -0.7).abs() <= JULIA_DRIFT * 5.0 + 1e-9);
    }

    #[test]
    fn nothing_runs_before_first_period() {
        let start = Instant::now();
        let mut driver = driver(start);
        let mut state = ViewportState::default();
        state.set_auto_evolve(true);
        assert_eq!(driver.tick(&mut state, start), 0);
        assert_eq!(driver.tick(&mut state, start + EVOLVE_PERIOD / 2), 0);
        assert_eq!(driver.tick(&mut state, start + EVOLVE_PERIOD), 1);
    }

    #[test]
    fn toggling_off_stops_mutation() {
        let start = Instant::now();
        let mut driver = driver(start);
        let mut state = ViewportState::default();
        driver.set_auto_evolve(&mut state, true, start);
        driver.tick(&mut state, start + EVOLVE_PERIOD);

        driver.set_auto_evolve(&mut state, false, start + EVOLVE_PERIOD);
        assert!(!driver.is_evolving());
        let frozen = state.clone();
        assert_eq!(driver.tick(&mut state, start + EVOLVE_PERIOD * 30), 0);
        assert_eq!(state, frozen);
    }

    #[test]
    fn flag_cleared_elsewhere_cancels_on_next_tick() {
        let start = Instant::now();
        let mut driver = driver(start);
        let mut state = ViewportState::default();
        driver.set_auto_evolve(&mut state, true, start);
        state.set_auto_evolve(false);
        let frozen = state.clone();
        assert_eq!(driver.tick(&mut state, start + EVOLVE_PERIOD * 3), 0);
        assert_eq!(state, frozen);
    }

    #[test]
    fn stop_outlives_the_flag() {
        let start = Instant::now();
        let mut driver = driver(start);
        let mut state = ViewportState::default();
        driver.set_auto_evolve(&mut state, true, start);
        driver.stop();
        assert!(state.auto_evolve());
        assert_eq!(driver.tick(&mut state, start + EVOLVE_PERIOD * 10), 0);
        driver.set_auto_evolve(&mut state, true, start);
        assert!(!driver.is_evolving());
    }

    #[test]
    fn stalls_replay_a_bounded_number_of_ticks() {
        let start = Instant::now();
        let mut driver = driver(start);
        let mut state = ViewportState::default();
        driver.set_auto_evolve(&mut state, true, start);
        let late = start + Duration::from_secs(60);
        assert_eq!(driver.tick(&mut state, late), MAX_CATCH_UP);
        assert_eq!(driver.tick(&mut state, late), 0);
        assert_eq!(driver.tick(&mut state, late + EVOLVE_PERIOD), 1);
    }

    #[test]
    fn paint_decays_every_frame() {
        let mut driver = driver(Instant::now());
        let mut state = ViewportState::default();
        state.apply_paint(Complex::new(0.0, 0.0), 1.0);
        for _ in 0..10 {
            driver.end_frame(&mut state);
        }
        assert!((state.paint_intensity() - PAINT_DECAY.powi(10)).abs() < 1e-12);
    }

    #[test]
    fn clock_never_runs_backwards() {
        let start = Instant::now();
        let clock = SessionClock::start(start + Duration::from_secs(1));
        assert_eq!(clock.elapsed(start), 0.0);
        assert!((clock.elapsed(start + Duration::from_millis(1500)) - 0.5).abs() < 1e-9);
    }
}
