//! Close-on-outside-press behavior for popups such as the suggestion list.
//!
//! Presses are routed to the controller by its owner; there is no global
//! listener, so detaching the controller is all the cleanup there is.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned region; the right and bottom edges are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x < self.x + self.width
            && point.y < self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// The press landed outside while visible; now hidden.
    Dismissed,
    Inside,
    /// Not attached, or already hidden.
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct DismissalController {
    region: Option<Bounds>,
    visible: bool,
}

impl DismissalController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start reacting to presses outside `region`.
    pub fn attach(&mut self, region: Bounds) {
        self.region = Some(region);
    }

    pub fn detach(&mut self) {
        self.region = None;
    }

    pub fn is_attached(&self) -> bool {
        self.region.is_some()
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn on_press(&mut self, at: Point) -> PressOutcome {
        let Some(region) = self.region else {
            return PressOutcome::Ignored;
        };

        if region.contains(at) {
            PressOutcome::Inside
        } else if self.visible {
            self.visible = false;
            PressOutcome::Dismissed
        } else {
            PressOutcome::Ignored
        }
    }
}
