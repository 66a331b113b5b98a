//! Connection opportunities and connection windows.
//!
//! A connection opportunity is an external service (a commuter train, a
//! school bell, another bus route) that the schedule should meet at a given
//! time point. The connection window decides how good the achieved gap is.
//!
//! # Gap Convention
//!
//! | Transfer | Gap |
//! |----------|-----|
//! | `ToService` (bus → service) | `target_time − bus arrival` |
//! | `FromService` (service → bus) | `bus departure − target_time` |
//!
//! In both cases a negative gap means the transfer is impossible.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{DayType, Minutes};

/// Kind of external service a connection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConnectionType {
    /// Another bus route.
    BusRoute,
    /// Commuter (GO) train.
    GoTrain,
    /// School bell time.
    SchoolBell,
}

impl ConnectionType {
    /// All connection types, in declaration order.
    pub const ALL: [ConnectionType; 3] = [Self::BusRoute, Self::GoTrain, Self::SchoolBell];

    /// Transfer direction used when an opportunity does not set one.
    pub fn default_transfer(self) -> TransferDirection {
        match self {
            Self::BusRoute | Self::GoTrain => TransferDirection::FromService,
            Self::SchoolBell => TransferDirection::ToService,
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BusRoute => "bus route",
            Self::GoTrain => "GO train",
            Self::SchoolBell => "school bell",
        };
        f.write_str(s)
    }
}

/// Which way passengers transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferDirection {
    /// From the bus to the external service; the bus must arrive first.
    ToService,
    /// From the external service to the bus; the bus must depart after.
    FromService,
}

/// Quality class of an achieved connection gap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WindowClass {
    /// Inside the ideal band.
    #[default]
    Ideal,
    /// Inside the partial band but not the ideal band.
    Partial,
    /// Outside every band, negative, or beyond the missed threshold.
    Missed,
}

impl WindowClass {
    /// Score value of the class (ideal 1.0, partial 0.5, missed 0.0).
    pub fn value(self) -> f64 {
        match self {
            Self::Ideal => 1.0,
            Self::Partial => 0.5,
            Self::Missed => 0.0,
        }
    }

    /// Whether this class is at least as good as `target`.
    ///
    /// Variants are declared best-first, so "better" means "smaller".
    pub fn meets(self, target: WindowClass) -> bool {
        self <= target
    }
}

impl fmt::Display for WindowClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ideal => "ideal",
            Self::Partial => "partial",
            Self::Missed => "missed",
        };
        f.write_str(s)
    }
}

/// An inclusive range of gap minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBand {
    /// Smallest acceptable gap (inclusive).
    pub min: Minutes,
    /// Largest acceptable gap (inclusive).
    pub max: Minutes,
}

impl WindowBand {
    /// Creates a band.
    pub fn new(min: Minutes, max: Minutes) -> Self {
        Self { min, max }
    }

    /// Whether `gap` lies inside the band.
    #[inline]
    pub fn contains(&self, gap: Minutes) -> bool {
        gap >= self.min && gap <= self.max
    }

    /// Whether `other` lies entirely inside this band.
    pub fn encloses(&self, other: &WindowBand) -> bool {
        self.min <= other.min && other.max <= self.max
    }

    /// Signed distance from `gap` to the nearest point of the band.
    ///
    /// Zero when `gap` is inside.
    pub fn distance(&self, gap: Minutes) -> Minutes {
        if gap < self.min {
            self.min.saturating_sub(gap)
        } else if gap > self.max {
            self.max.saturating_sub(gap)
        } else {
            0
        }
    }
}

/// Classification thresholds for one connection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionWindow {
    /// Ideal gap band.
    pub ideal: WindowBand,
    /// Partial gap band (should enclose the ideal band).
    pub partial: WindowBand,
    /// Gaps above this are missed regardless of bands.
    pub missed_threshold: Minutes,
}

impl ConnectionWindow {
    /// Creates a window.
    pub fn new(ideal: WindowBand, partial: WindowBand, missed_threshold: Minutes) -> Self {
        Self {
            ideal,
            partial,
            missed_threshold,
        }
    }

    /// Preset thresholds for a connection type.
    pub fn default_for(connection_type: ConnectionType) -> Self {
        match connection_type {
            ConnectionType::GoTrain => Self::new(WindowBand::new(5, 10), WindowBand::new(2, 15), 20),
            ConnectionType::BusRoute => Self::new(WindowBand::new(3, 8), WindowBand::new(1, 12), 15),
            ConnectionType::SchoolBell => {
                Self::new(WindowBand::new(5, 15), WindowBand::new(2, 20), 30)
            }
        }
    }

    /// The band a connection must reach to count as `class`.
    ///
    /// `Missed` has no band; any gap satisfies it.
    pub fn band_for(&self, class: WindowClass) -> Option<WindowBand> {
        match class {
            WindowClass::Ideal => Some(self.ideal),
            WindowClass::Partial => Some(self.partial),
            WindowClass::Missed => None,
        }
    }

    /// Whether the window is internally consistent.
    ///
    /// Bands must be non-empty, non-negative, the partial band must enclose
    /// the ideal band, and the threshold must not cut into the ideal band.
    pub fn is_consistent(&self) -> bool {
        self.ideal.min >= 0
            && self.ideal.min <= self.ideal.max
            && self.partial.min <= self.partial.max
            && self.partial.encloses(&self.ideal)
            && self.missed_threshold >= self.ideal.max
    }
}

/// Connection windows keyed by connection type, with preset fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionWindows {
    windows: BTreeMap<ConnectionType, ConnectionWindow>,
}

impl ConnectionWindows {
    /// Creates an empty set (every type uses its preset).
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the window of a connection type.
    pub fn with_window(mut self, connection_type: ConnectionType, window: ConnectionWindow) -> Self {
        self.windows.insert(connection_type, window);
        self
    }

    /// Window for a connection type (configured or preset).
    pub fn get(&self, connection_type: ConnectionType) -> ConnectionWindow {
        self.windows
            .get(&connection_type)
            .copied()
            .unwrap_or_else(|| ConnectionWindow::default_for(connection_type))
    }

    /// Explicitly configured windows.
    pub fn configured(&self) -> impl Iterator<Item = (&ConnectionType, &ConnectionWindow)> {
        self.windows.iter()
    }
}

/// An external service the schedule should connect with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOpportunity {
    /// Unique opportunity identifier.
    pub id: String,
    /// Kind of external service.
    pub connection_type: ConnectionType,
    /// Time point where the transfer happens.
    pub location_id: String,
    /// Time of the external service at the location.
    pub target_time: Minutes,
    /// Importance (1-10, higher = more important).
    pub priority: u8,
    /// Class the connection must reach to count as made.
    #[serde(default)]
    pub window_hint: WindowClass,
    /// Transfer direction.
    pub transfer: TransferDirection,
    /// Days the external service runs. Empty = every day.
    #[serde(default)]
    pub operating_days: Vec<DayType>,
    /// Trips that may serve the connection. Empty = every trip at the location.
    #[serde(default)]
    pub affected_trips: Vec<u32>,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

impl ConnectionOpportunity {
    /// Creates an opportunity with priority 5 and an ideal target.
    pub fn new(
        id: impl Into<String>,
        connection_type: ConnectionType,
        location_id: impl Into<String>,
        target_time: Minutes,
    ) -> Self {
        Self {
            id: id.into(),
            connection_type,
            location_id: location_id.into(),
            target_time,
            priority: 5,
            window_hint: WindowClass::Ideal,
            transfer: connection_type.default_transfer(),
            operating_days: Vec::new(),
            affected_trips: Vec::new(),
            description: String::new(),
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the class the connection must reach.
    pub fn with_window_hint(mut self, class: WindowClass) -> Self {
        self.window_hint = class;
        self
    }

    /// Sets the transfer direction.
    pub fn with_transfer(mut self, transfer: TransferDirection) -> Self {
        self.transfer = transfer;
        self
    }

    /// Adds an operating day.
    pub fn with_operating_day(mut self, day: DayType) -> Self {
        self.operating_days.push(day);
        self
    }

    /// Adds an affected trip.
    pub fn with_affected_trip(mut self, trip_number: u32) -> Self {
        self.affected_trips.push(trip_number);
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether the external service runs on `day`.
    pub fn operates_on(&self, day: DayType) -> bool {
        self.operating_days.is_empty() || self.operating_days.contains(&day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_class_ordering() {
        assert!(WindowClass::Ideal.meets(WindowClass::Ideal));
        assert!(WindowClass::Ideal.meets(WindowClass::Partial));
        assert!(WindowClass::Partial.meets(WindowClass::Partial));
        assert!(!WindowClass::Partial.meets(WindowClass::Ideal));
        assert!(WindowClass::Missed.meets(WindowClass::Missed));
        assert!(!WindowClass::Missed.meets(WindowClass::Partial));
        assert!(WindowClass::Ideal.value() > WindowClass::Partial.value());
    }

    #[test]
    fn test_band_distance() {
        let band = WindowBand::new(5, 10);
        assert_eq!(band.distance(3), 2);
        assert_eq!(band.distance(5), 0);
        assert_eq!(band.distance(10), 0);
        assert_eq!(band.distance(14), -4);
    }

    #[test]
    fn test_presets_are_consistent() {
        for t in ConnectionType::ALL {
            assert!(ConnectionWindow::default_for(t).is_consistent(), "{t}");
        }
    }

    #[test]
    fn test_inconsistent_window() {
        let w = ConnectionWindow::new(WindowBand::new(5, 10), WindowBand::new(6, 15), 20);
        assert!(!w.is_consistent());
        let w2 = ConnectionWindow::new(WindowBand::new(5, 10), WindowBand::new(2, 15), 8);
        assert!(!w2.is_consistent());
    }

    #[test]
    fn test_windows_fallback_to_preset() {
        let custom = ConnectionWindow::new(WindowBand::new(1, 2), WindowBand::new(0, 4), 6);
        let windows = ConnectionWindows::new().with_window(ConnectionType::GoTrain, custom);
        assert_eq!(windows.get(ConnectionType::GoTrain), custom);
        assert_eq!(
            windows.get(ConnectionType::SchoolBell),
            ConnectionWindow::default_for(ConnectionType::SchoolBell)
        );
    }

    #[test]
    fn test_opportunity_builder() {
        let o = ConnectionOpportunity::new("GO-1", ConnectionType::GoTrain, "STN", 480)
            .with_priority(9)
            .with_operating_day(DayType::Weekday)
            .with_affected_trip(3);
        assert_eq!(o.transfer, TransferDirection::FromService);
        assert_eq!(o.window_hint, WindowClass::Ideal);
        assert!(o.operates_on(DayType::Weekday));
        assert!(!o.operates_on(DayType::Sunday));
        assert_eq!(o.affected_trips, vec![3]);

        let bell = ConnectionOpportunity::new("B", ConnectionType::SchoolBell, "SCH", 500);
        assert_eq!(bell.transfer, TransferDirection::ToService);
        assert!(bell.operates_on(DayType::Sunday));
    }

    #[test]
    fn test_windows_serde_transparent() {
        let windows = ConnectionWindows::new()
            .with_window(ConnectionType::BusRoute, ConnectionWindow::default_for(ConnectionType::BusRoute));
        let json = serde_json::to_string(&windows).unwrap();
        assert!(json.starts_with("{\"BusRoute\""));
        let back: ConnectionWindows = serde_json::from_str(&json).unwrap();
        assert_eq!(back, windows);
    }
}
