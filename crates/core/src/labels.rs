//! Display text derived from mixer state. Pure functions only, so the state
//! machine can be tested without any rendering surface.

use crate::{GainLevel, PlaybackState, Source};

/// Gain expressed as a whole percentage, rounded to nearest.
pub fn gain_percent(level: GainLevel) -> u32 {
    (level.value() * 100.0).round() as u32
}

/// Slider label, e.g. `Guitar: 73%`.
pub fn gain_label(source: Source, level: GainLevel) -> String {
    format!("{}: {}%", source.label(), gain_percent(level))
}

/// Title of the play button: the action it will perform next.
pub fn play_button_title(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Playing => "Stop",
        PlaybackState::Stopped => "Play",
    }
}

pub fn spectrum_caption(source: Source) -> String {
    format!("FFT Frequency Spectrum ({})", source.label())
}
