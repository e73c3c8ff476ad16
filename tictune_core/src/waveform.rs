//! Normalized motion requests in [-1, 1] as a function of elapsed seconds.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WaveformMode {
    /// No generated motion; the operator target (if any) is held.
    #[default]
    None,
    Sine,
    DoubleSine,
    TripleBlend,
    PingPong,
}

impl WaveformMode {
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Sine,
        Self::DoubleSine,
        Self::TripleBlend,
        Self::PingPong,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sine => "sine",
            Self::DoubleSine => "double-sine",
            Self::TripleBlend => "triple-blend",
            Self::PingPong => "ping-pong",
        }
    }
}

impl fmt::Display for WaveformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WaveformMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown waveform '{s}' (expected none|sine|double-sine|triple-blend|ping-pong)"
                )
            })
    }
}

/// Flip schedule for `PingPong`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PingPongState {
    level: f64,
    next_flip: Option<f64>,
}

impl PingPongState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Waveform value at `t` seconds. Only `PingPong` touches `state`.
pub fn request(mode: WaveformMode, t: f64, state: &mut PingPongState) -> f64 {
    match mode {
        WaveformMode::None => 0.0,
        WaveformMode::Sine => t.sin(),
        WaveformMode::DoubleSine => (2.0 * t).sin(),
        WaveformMode::TripleBlend => ((2.0 * PI * t).sin() + (t / 2.0 * PI).cos()) / 2.0,
        WaveformMode::PingPong => match state.next_flip {
            None => {
                state.level = 1.0;
                state.next_flip = Some(t + 1.0);
                state.level
            }
            Some(next) if t > next => {
                state.level = -state.level;
                state.next_flip = Some(t + 1.0);
                state.level
            }
            Some(_) => state.level,
        },
    }
}

/// Mode selection plus the `PingPong` schedule. Switching modes is abrupt.
#[derive(Debug, Clone, Default)]
pub struct WaveformGenerator {
    mode: WaveformMode,
    ping_pong: PingPongState,
}

impl WaveformGenerator {
    pub fn new(mode: WaveformMode) -> Self {
        Self {
            mode,
            ping_pong: PingPongState::default(),
        }
    }

    pub fn mode(&self) -> WaveformMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: WaveformMode) {
        if mode != self.mode {
            self.ping_pong.reset();
        }
        self.mode = mode;
    }

    pub fn request(&mut self, t: f64) -> f64 {
        request(self.mode, t, &mut self.ping_pong)
    }
}
