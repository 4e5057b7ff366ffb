/// Easing curves for programmatic scroll animations.
///
/// `OutCubic` matches the `Power2.easeOut` curve used for section scroll-to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Ease {
    Linear,
    OutQuad,
    #[default]
    OutCubic,
    InOutCubic,
    OutQuart,
}

impl Ease {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
            Self::OutQuart => 1.0 - (1.0 - t).powi(4),
        }
    }
}

/// One scalar animation from `from` to `to`, sampled against a millisecond clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tween {
    pub from: f64,
    pub to: f64,
    pub start_ms: u64,
    pub duration_ms: u64, // >= 1
    pub ease: Ease,
}

impl Tween {
    pub fn new(from: f64, to: f64, start_ms: u64, duration_ms: u64, ease: Ease) -> Self {
        Self {
            from,
            to,
            start_ms,
            duration_ms: duration_ms.max(1),
            ease,
        }
    }

    pub fn progress(&self, now_ms: u64) -> f64 {
        let elapsed = now_ms.saturating_sub(self.start_ms);
        (elapsed as f64 / self.duration_ms as f64).clamp(0.0, 1.0)
    }

    pub fn sample(&self, now_ms: u64) -> f64 {
        let te = self.ease.apply(self.progress(now_ms));
        self.from + (self.to - self.from) * te
    }

    pub fn is_done(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.start_ms) >= self.duration_ms
    }

    /// Restart from the current sampled value toward a new target.
    pub fn retarget(&mut self, now_ms: u64, to: f64, duration_ms: u64) {
        let current = self.sample(now_ms);
        *self = Self::new(current, to, now_ms, duration_ms, self.ease);
    }
}
