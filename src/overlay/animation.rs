use std::time::{Duration, Instant};

/// A 0..1 value eased linearly towards a target. Re-targeting starts from
/// wherever the value currently is, so an interrupted fade never jumps.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityAnimation {
    from: f32,
    to: f32,
    started_at: Option<Instant>,
    duration: Duration,
}

impl VisibilityAnimation {
    pub fn hidden() -> Self {
        Self {
            from: 0.0,
            to: 0.0,
            started_at: None,
            duration: Duration::ZERO,
        }
    }

    /// Returns false when already heading to `target`; the running animation
    /// is left untouched.
    pub fn animate_to(&mut self, target: f32, duration: Duration, now: Instant) -> bool {
        if self.to == target {
            return false;
        }
        self.from = self.value_at(now);
        self.to = target;
        self.started_at = Some(now);
        self.duration = duration;
        true
    }

    pub fn value_at(&self, now: Instant) -> f32 {
        let Some(started_at) = self.started_at else {
            return self.to;
        };
        if self.duration.is_zero() {
            return self.to;
        }
        let progress = (now.saturating_duration_since(started_at).as_secs_f32()
            / self.duration.as_secs_f32())
        .clamp(0.0, 1.0);
        self.from + (self.to - self.from) * progress
    }

    pub fn is_settled(&self, now: Instant) -> bool {
        self.value_at(now) == self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_target_does_not_restart() {
        let start = Instant::now();
        let mut anim = VisibilityAnimation::hidden();
        assert!(anim.animate_to(1.0, Duration::from_millis(200), start));

        let mid = start + Duration::from_millis(100);
        assert!(!anim.animate_to(1.0, Duration::from_millis(200), mid));
        assert!((anim.value_at(mid) - 0.5).abs() < 1e-3);
        assert_eq!(anim.value_at(start + Duration::from_millis(300)), 1.0);
    }

    #[test]
    fn reversal_starts_from_current_value() {
        let start = Instant::now();
        let mut anim = VisibilityAnimation::hidden();
        anim.animate_to(1.0, Duration::from_millis(100), start);

        let mid = start + Duration::from_millis(50);
        anim.animate_to(0.0, Duration::from_millis(100), mid);
        assert!((anim.value_at(mid) - 0.5).abs() < 1e-3);
        assert!(anim.is_settled(mid + Duration::from_millis(100)));
    }
}
