use std::{cell::RefCell, rc::Rc};

use serde::Serialize;

use crate::{BarGeometry, Source};

/// Receives everything the presentation layer needs to redraw.
///
/// All callbacks run on the controller's thread, synchronously inside the
/// transition that caused them.
pub trait MixerObserver {
    /// Emitted once per accepted tick and after a resize.
    fn on_spectrum_updated(&mut self, bars: &[BarGeometry]);

    fn on_play_state_changed(&mut self, playing: bool);

    fn on_gain_changed(&mut self, source: Source, percent: u32);

    /// Emitted when a backend swap turns the spectrum view on or off.
    fn on_visualization_changed(&mut self, _enabled: bool) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl MixerObserver for NullObserver {
    fn on_spectrum_updated(&mut self, _bars: &[BarGeometry]) {}
    fn on_play_state_changed(&mut self, _playing: bool) {}
    fn on_gain_changed(&mut self, _source: Source, _percent: u32) {}
}

/// One recorded observer notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MixerEvent {
    SpectrumUpdated(Vec<BarGeometry>),
    PlayStateChanged(bool),
    GainChanged { source: Source, percent: u32 },
    VisualizationChanged(bool),
}

/// Observer that appends every notification to a shared list. Clones share
/// the same list, so one clone can be handed to the controller while another
/// is kept for inspection.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Rc<RefCell<Vec<MixerEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MixerEvent> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<MixerEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Bars from the most recent spectrum update, if any.
    pub fn last_bars(&self) -> Option<Vec<BarGeometry>> {
        self.events.borrow().iter().rev().find_map(|event| match event {
            MixerEvent::SpectrumUpdated(bars) => Some(bars.clone()),
            _ => None,
        })
    }

    pub fn spectrum_updates(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, MixerEvent::SpectrumUpdated(_)))
            .count()
    }

    fn push(&self, event: MixerEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl MixerObserver for EventLog {
    fn on_spectrum_updated(&mut self, bars: &[BarGeometry]) {
        self.push(MixerEvent::SpectrumUpdated(bars.to_vec()));
    }

    fn on_play_state_changed(&mut self, playing: bool) {
        self.push(MixerEvent::PlayStateChanged(playing));
    }

    fn on_gain_changed(&mut self, source: Source, percent: u32) {
        self.push(MixerEvent::GainChanged { source, percent });
    }

    fn on_visualization_changed(&mut self, enabled: bool) {
        self.push(MixerEvent::VisualizationChanged(enabled));
    }
}
