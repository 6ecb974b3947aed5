//! Enumeration types for the workforce simulation.
//!
//! Event kinds form a closed set with a fixed causal order: later stages
//! consume the output of earlier ones within the same simulation year.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// The kind of a workforce event.
///
/// The declaration order is the causal order in which the generators run
/// each year. [`EventKind::CAUSAL_ORDER`] lists the same sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An experienced (pre-existing) employee leaves.
    Termination,
    /// An employee moves up one level.
    Promotion,
    /// An employee receives a merit and cost-of-living raise.
    Merit,
    /// A new employee joins.
    Hire,
    /// An employee hired in the current year leaves in the same year.
    NewHireTermination,
    /// An employee starts deferring into the plan.
    Enrollment,
    /// An enrolled employee's deferral rate is automatically increased.
    Escalation,
}

impl EventKind {
    /// Every event kind in the order the generators must run.
    pub const CAUSAL_ORDER: [Self; 7] = [
        Self::Termination,
        Self::Promotion,
        Self::Merit,
        Self::Hire,
        Self::NewHireTermination,
        Self::Enrollment,
        Self::Escalation,
    ];

    /// Position of this kind in [`EventKind::CAUSAL_ORDER`].
    pub const fn causal_rank(self) -> u8 {
        match self {
            Self::Termination => 0,
            Self::Promotion => 1,
            Self::Merit => 2,
            Self::Hire => 3,
            Self::NewHireTermination => 4,
            Self::Enrollment => 5,
            Self::Escalation => 6,
        }
    }

    /// Stable tag used for hashing, persistence, and log fields.
    ///
    /// Tags must never change once assigned: they feed the deterministic
    /// draw function and the persisted `event_kind` column.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Termination => "termination",
            Self::Promotion => "promotion",
            Self::Merit => "merit",
            Self::Hire => "hire",
            Self::NewHireTermination => "new_hire_termination",
            Self::Enrollment => "enrollment",
            Self::Escalation => "escalation",
        }
    }

    /// Parse a persisted tag back into an event kind.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::CAUSAL_ORDER.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Whether this kind ends employment.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Termination | Self::NewHireTermination)
    }

    /// Whether selection for this kind is driven by the hazard table.
    ///
    /// Hiring volume is computed from the growth target instead.
    pub const fn uses_hazard(self) -> bool {
        !matches!(self, Self::Hire)
    }

    /// Event kinds whose probabilities come from the hazard table.
    pub const HAZARD_KINDS: [Self; 6] = [
        Self::Termination,
        Self::Promotion,
        Self::Merit,
        Self::NewHireTermination,
        Self::Enrollment,
        Self::Escalation,
    ];
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// Demographic bands
// ---------------------------------------------------------------------------

/// Age band used as a hazard dimension and for default deferral rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    /// Younger than 25.
    #[serde(rename = "under_25")]
    Under25,
    /// 25 through 34.
    #[serde(rename = "25_34")]
    From25To34,
    /// 35 through 44.
    #[serde(rename = "35_44")]
    From35To44,
    /// 45 through 54.
    #[serde(rename = "45_54")]
    From45To54,
    /// 55 through 64.
    #[serde(rename = "55_64")]
    From55To64,
    /// 65 and older.
    #[serde(rename = "65_plus")]
    Age65Plus,
}

impl AgeBand {
    /// All bands in ascending order.
    pub const ALL: [Self; 6] = [
        Self::Under25,
        Self::From25To34,
        Self::From35To44,
        Self::From45To54,
        Self::From55To64,
        Self::Age65Plus,
    ];

    /// Band containing the given age in whole years.
    pub const fn from_age(age: u32) -> Self {
        match age {
            0..=24 => Self::Under25,
            25..=34 => Self::From25To34,
            35..=44 => Self::From35To44,
            45..=54 => Self::From45To54,
            55..=64 => Self::From55To64,
            _ => Self::Age65Plus,
        }
    }
}

/// Tenure band used as a hazard dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TenureBand {
    /// Less than two years of service.
    #[serde(rename = "under_2")]
    Under2,
    /// Two through four years.
    #[serde(rename = "2_4")]
    From2To4,
    /// Five through nine years.
    #[serde(rename = "5_9")]
    From5To9,
    /// Ten through nineteen years.
    #[serde(rename = "10_19")]
    From10To19,
    /// Twenty years or more.
    #[serde(rename = "20_plus")]
    Years20Plus,
}

impl TenureBand {
    /// All bands in ascending order.
    pub const ALL: [Self; 5] = [
        Self::Under2,
        Self::From2To4,
        Self::From5To9,
        Self::From10To19,
        Self::Years20Plus,
    ];

    /// Band containing the given tenure in whole years.
    pub const fn from_years(years: u32) -> Self {
        match years {
            0..=1 => Self::Under2,
            2..=4 => Self::From2To4,
            5..=9 => Self::From5To9,
            10..=19 => Self::From10To19,
            _ => Self::Years20Plus,
        }
    }
}

// ---------------------------------------------------------------------------
// Statuses and provenance
// ---------------------------------------------------------------------------

/// End-of-year status of an entity in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailedStatus {
    /// Active at the start of the year and still active at year end.
    ContinuousActive,
    /// Active at the start of the year, terminated during it.
    ExperiencedTermination,
    /// Hired during the year and still active at year end.
    NewHireActive,
    /// Hired and terminated within the same year.
    NewHireTermination,
}

impl DetailedStatus {
    /// Whether the entity is employed at year end.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::ContinuousActive | Self::NewHireActive)
    }

    /// Whether the entity joined during the snapshot year.
    pub const fn is_new_hire(self) -> bool {
        matches!(self, Self::NewHireActive | Self::NewHireTermination)
    }
}

/// How an enrollment came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentSource {
    /// Enrolled by the plan's automatic-enrollment feature.
    AutoEnrollment,
    /// The employee elected to enroll.
    Voluntary,
}

/// Where an accumulator record's values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Seeded from the segment default before the first simulated year.
    BaselineDefault,
    /// Seeded from the deferral election recorded in the baseline census.
    BaselineCensus,
    /// Carried forward unchanged from the prior year's record.
    CarriedForward,
    /// First record for a new hire that has not enrolled.
    NewHire,
    /// Updated by an enrollment event this year.
    Enrolled,
    /// Updated by an escalation event this year.
    Escalated,
}
