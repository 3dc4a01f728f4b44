//! Volume envelope for fade-in/fade-out windows
//!
//! Maps a media-relative position to an instantaneous linear volume.
//!
//! # Timing Points
//!
//! - **Fade-in start**: silence before this point (the sound's start position)
//! - **Fade-in end**: full (gain-adjusted) volume begins
//! - **Fade-out start**: volume ramp to zero begins
//! - **Fade-out end**: silence from here on (end of media)
//!
//! Both ramps are linear. A window whose start equals its end is treated as
//! "no fade".

/// A fade window in media-relative seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeWindow {
    /// Ramp start (seconds)
    pub start: f64,
    /// Ramp end (seconds)
    pub end: f64,
}

impl FadeWindow {
    /// Build a window, returning `None` when it is degenerate or malformed
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if !start.is_finite() || !end.is_finite() || end <= start {
            return None;
        }
        Some(Self { start, end })
    }

    /// Fade-in window beginning at `start_seconds` and lasting `length_seconds`
    pub fn fade_in(start_seconds: f64, length_seconds: f64) -> Option<Self> {
        Self::new(start_seconds, start_seconds + length_seconds)
    }

    /// Fade-out window ending at `end_seconds` and lasting `length_seconds`
    ///
    /// A fade longer than the media is clamped to begin at 0.
    pub fn fade_out(end_seconds: f64, length_seconds: f64) -> Option<Self> {
        Self::new((end_seconds - length_seconds).max(0.0), end_seconds)
    }

    /// Whether `t` lies within `[start, end]`
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    /// Normalized progress of `t` through the window, clamped to 0..=1
    fn progress(&self, t: f64) -> f64 {
        ((t - self.start) / (self.end - self.start)).clamp(0.0, 1.0)
    }
}

/// Volume after applying per-track gain to the session volume
///
/// `base_volume` is the 0-100 session level. Without gain the result is
/// simply `base_volume / 100`. With gain the session level is mapped onto a
/// 50% reference so that positive gain has headroom:
/// `clamp(base/100 * 50 * 10^(gain/20), 0, 100) / 100`.
pub fn gain_adjusted_volume(base_volume: u8, gain_db: Option<f64>) -> f64 {
    let base = f64::from(base_volume.min(100)) / 100.0;
    match gain_db {
        Some(gain) if gain.is_finite() => {
            (base * 50.0 * 10f64.powf(gain / 20.0)).clamp(0.0, 100.0) / 100.0
        }
        _ => base,
    }
}

/// Envelope inputs for one sound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeEnvelope {
    /// Fade-in window, if configured
    pub fade_in: Option<FadeWindow>,
    /// Fade-out window, if configured and finalized
    pub fade_out: Option<FadeWindow>,
    /// Per-track gain in dB
    pub gain_db: Option<f64>,
}

impl VolumeEnvelope {
    /// Calculate volume (0.0 to 1.0) at media position `t` seconds
    ///
    /// # Arguments
    /// * `t` - Media-relative position in seconds
    /// * `base_volume` - Session volume (0-100)
    pub fn volume_at(&self, t: f64, base_volume: u8) -> f32 {
        let full = gain_adjusted_volume(base_volume, self.gain_db);

        let volume = if let Some(fade_in) = self.fade_in.filter(|w| t < w.end) {
            if t < fade_in.start {
                // Before fade-in: silence
                0.0
            } else {
                full * fade_in.progress(t)
            }
        } else if let Some(fade_out) = self.fade_out {
            if t > fade_out.end {
                0.0
            } else if t >= fade_out.start {
                full * (1.0 - fade_out.progress(t))
            } else {
                full
            }
        } else {
            full
        };

        volume.clamp(0.0, 1.0) as f32
    }

    /// Whether `t` has entered the fade-out window
    pub fn in_fade_out(&self, t: f64) -> bool {
        self.fade_out.is_some_and(|w| t >= w.start)
    }

    /// Whether `t` is past the end of the fade-out window
    pub fn past_fade_out(&self, t: f64) -> bool {
        self.fade_out.is_some_and(|w| t >= w.end)
    }
}

// ========================================
// Tests
// ========================================
