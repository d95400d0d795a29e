//! Text entry → suggestion list → debounced commit.

use log::{debug, info, trace};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

use crate::{
    catalog::CityCatalog,
    dismissal::{Bounds, DismissalController, Point, PressOutcome},
    model::City,
    timer::DebounceTimer,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    /// No text entered.
    Empty,
    /// Text pending commit with the list hidden.
    Typing,
    /// Text pending commit with the list shown.
    Suggesting,
    /// A commit is being emitted.
    Committing,
    /// Nothing pending; the last commit stands.
    Committed,
}

/// Read-only view of the search box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchState {
    pub raw_input: String,
    pub suggestions: Vec<City>,
    pub list_visible: bool,
    pub pending_city: Option<City>,
    pub committed_city: Option<City>,
    pub phase: SearchPhase,
}

#[derive(Debug)]
pub struct CitySearchController {
    catalog: Arc<CityCatalog>,
    raw_input: String,
    suggestions: Vec<City>,
    list: DismissalController,
    debounce: DebounceTimer,
    committed: Option<City>,
    phase: SearchPhase,
}

impl CitySearchController {
    pub fn new(catalog: Arc<CityCatalog>, debounce: Duration) -> Self {
        Self {
            catalog,
            raw_input: String::new(),
            suggestions: Vec::new(),
            list: DismissalController::new(),
            debounce: DebounceTimer::new(debounce),
            committed: None,
            phase: SearchPhase::Empty,
        }
    }

    /// Attach the outside-press region of the search box and its list.
    pub fn mount(&mut self, region: Bounds) {
        self.list.attach(region);
    }

    /// Tear down: no commit can fire after this.
    pub fn unmount(&mut self) {
        if self.debounce.cancel() {
            debug!("Pending city commit dropped on unmount");
        }
        self.list.detach();
        self.list.hide();
    }

    /// A keystroke: `raw` is the full text of the input after the edit.
    pub fn on_input(&mut self, raw: &str, now: Instant) {
        self.set_phase(SearchPhase::Typing);
        self.raw_input = raw.to_string();

        if raw.is_empty() {
            self.suggestions.clear();
            self.list.hide();
            self.set_phase(SearchPhase::Empty);
        } else {
            self.suggestions = self.catalog.search(raw);
            self.list.show();
            self.set_phase(SearchPhase::Suggesting);
        }

        self.debounce.restart(now);
    }

    /// Fire the debounce if it is due. Returns the committed city, if any.
    pub fn poll(&mut self, now: Instant) -> Option<City> {
        if !self.debounce.fire(now) {
            return None;
        }

        self.list.hide();
        match City::new(&self.raw_input) {
            Some(city) => Some(self.commit(city)),
            None => {
                debug!("Debounce elapsed on blank input; nothing to commit");
                self.set_phase(SearchPhase::Empty);
                None
            }
        }
    }

    /// Pick a city explicitly. Supersedes any pending debounce.
    pub fn select(&mut self, city: City) -> City {
        if self.debounce.cancel() {
            trace!("Selection superseded pending debounce");
        }
        self.list.hide();
        self.raw_input = city.name().to_string();
        self.commit(city)
    }

    /// Pick the `index`-th visible suggestion.
    pub fn select_suggestion(&mut self, index: usize) -> Option<City> {
        if !self.list.is_visible() {
            return None;
        }
        let city = self.suggestions.get(index)?.clone();
        Some(self.select(city))
    }

    /// Route a press. Outside presses hide the list; nothing else changes.
    pub fn on_press(&mut self, at: Point) -> PressOutcome {
        let outcome = self.list.on_press(at);
        if outcome == PressOutcome::Dismissed && self.phase == SearchPhase::Suggesting {
            self.set_phase(SearchPhase::Typing);
        }
        outcome
    }

    /// Adopt a city supplied from outside (the profile) without a keystroke.
    pub fn seed(&mut self, city: City) {
        self.raw_input = city.name().to_string();
        self.committed = Some(city);
        if !self.debounce.is_armed() {
            self.set_phase(SearchPhase::Committed);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn committed_city(&self) -> Option<&City> {
        self.committed.as_ref()
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// Suggestions as rendered: empty while the list is hidden.
    pub fn visible_suggestions(&self) -> &[City] {
        if self.list.is_visible() { &self.suggestions } else { &[] }
    }

    pub fn state(&self) -> SearchState {
        SearchState {
            raw_input: self.raw_input.clone(),
            suggestions: self.suggestions.clone(),
            list_visible: self.list.is_visible(),
            pending_city: self.debounce.is_armed().then(|| City::new(&self.raw_input)).flatten(),
            committed_city: self.committed.clone(),
            phase: self.phase,
        }
    }

    fn commit(&mut self, city: City) -> City {
        self.set_phase(SearchPhase::Committing);
        info!("City committed: {city}");
        self.committed = Some(city.clone());
        self.set_phase(SearchPhase::Committed);
        city
    }

    fn set_phase(&mut self, next: SearchPhase) {
        if self.phase != next {
            trace!("search phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }
}
