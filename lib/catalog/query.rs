//! Catalog query parameters and URL construction

use crate::utils::errors::BellesubError;

use std::fmt;
use std::str::FromStr;
use url::Url;

/// Accepted `event_type` names, in catalog spelling.
pub const EVENT_TYPES: &[&str] = &[
    "Any",
    "evtgen-mixed",
    "evtgen-charged",
    "evtgen-charm",
    "evtgen-uds",
];

/// Accepted `data_type` names, in catalog spelling.
pub const DATA_TYPES: &[&str] = &[
    "Any",
    "on_resonance",
    "continuum",
    "5S_scan",
    "5S_onresonance",
    "1S_scan",
    "2S_scan",
    "3S_scan",
];

/// Belle MC event type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Any,
    Mixed,
    Charged,
    Charm,
    Uds,
}

impl EventType {
    const ALL: [EventType; 5] = [
        EventType::Any,
        EventType::Mixed,
        EventType::Charged,
        EventType::Charm,
        EventType::Uds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Any => "Any",
            EventType::Mixed => "evtgen-mixed",
            EventType::Charged => "evtgen-charged",
            EventType::Charm => "evtgen-charm",
            EventType::Uds => "evtgen-uds",
        }
    }
}

impl FromStr for EventType {
    type Err = BellesubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BellesubError::Validation(format!("Invalid event_type: {}", s)))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Belle data taking condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Any,
    OnResonance,
    Continuum,
    Scan5S,
    OnResonance5S,
    Scan1S,
    Scan2S,
    Scan3S,
}

impl DataType {
    const ALL: [DataType; 8] = [
        DataType::Any,
        DataType::OnResonance,
        DataType::Continuum,
        DataType::Scan5S,
        DataType::OnResonance5S,
        DataType::Scan1S,
        DataType::Scan2S,
        DataType::Scan3S,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Any => "Any",
            DataType::OnResonance => "on_resonance",
            DataType::Continuum => "continuum",
            DataType::Scan5S => "5S_scan",
            DataType::OnResonance5S => "5S_onresonance",
            DataType::Scan1S => "1S_scan",
            DataType::Scan2S => "2S_scan",
            DataType::Scan3S => "3S_scan",
        }
    }
}

impl FromStr for DataType {
    type Err = BellesubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BellesubError::Validation(format!("Invalid data_type: {}", s)))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MC stream selector: a stream number or every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Number(u32),
    Any,
}

impl FromStr for Stream {
    type Err = BellesubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "Any" {
            return Ok(Stream::Any);
        }
        s.parse::<u32>()
            .map(Stream::Number)
            .map_err(|_| BellesubError::Validation(format!("Invalid stream: {}", s)))
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stream::Number(n) => write!(f, "{}", n),
            Stream::Any => f.write_str("Any"),
        }
    }
}

/// Experiment information identifying a set of mdst files in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameters {
    /// Real data when true, MC otherwise
    pub is_data: bool,

    /// Experiment number
    pub experiment: u32,

    /// First run, inclusive
    pub run_start: u32,

    /// Last run, inclusive
    pub run_end: u32,

    /// MC only
    pub event_type: EventType,

    pub data_type: DataType,

    /// Belle processing level, e.g. "caseB"
    pub processing_level: String,

    /// MC only
    pub stream: Stream,

    /// Data only
    pub skim: String,
}

impl QueryParameters {
    /// Query every run of an experiment with the catalog defaults.
    pub fn new(is_data: bool, experiment: u32) -> Self {
        Self {
            is_data,
            experiment,
            run_start: 1,
            run_end: 9999,
            event_type: EventType::Any,
            data_type: DataType::Any,
            processing_level: "caseB".to_string(),
            stream: Stream::Number(0),
            skim: "HadronBorJ".to_string(),
        }
    }

    /// Reject parameter combinations the catalog cannot answer.
    pub fn validate(&self) -> Result<(), BellesubError> {
        if self.run_start > self.run_end {
            return Err(BellesubError::Validation(format!(
                "Invalid run range: {} > {}",
                self.run_start, self.run_end
            )));
        }
        if self.processing_level.trim().is_empty() {
            return Err(BellesubError::Validation(
                "Empty processing level".to_string(),
            ));
        }
        if self.is_data && self.skim.trim().is_empty() {
            return Err(BellesubError::Validation("Empty skim".to_string()));
        }
        Ok(())
    }

    /// Build the catalog page URL for this query under `base`.
    pub fn url(&self, base: &Url) -> Result<Url, BellesubError> {
        let (page, pairs) = if self.is_data {
            (
                "mdst.php",
                vec![
                    ("ex", self.experiment.to_string()),
                    ("rs", self.run_start.to_string()),
                    ("re", self.run_end.to_string()),
                    ("skm", self.skim.clone()),
                    ("dt", self.data_type.to_string()),
                    ("bl", self.processing_level.clone()),
                ],
            )
        } else {
            (
                "montecarlo.php",
                vec![
                    ("ex", self.experiment.to_string()),
                    ("rs", self.run_start.to_string()),
                    ("re", self.run_end.to_string()),
                    ("ty", self.event_type.to_string()),
                    ("dt", self.data_type.to_string()),
                    ("bl", self.processing_level.clone()),
                    ("st", self.stream.to_string()),
                ],
            )
        };

        let mut url = base
            .join(page)
            .map_err(|e| BellesubError::Validation(format!("Invalid catalog url: {}", e)))?;
        url.query_pairs_mut().clear().extend_pairs(pairs);
        Ok(url)
    }
}
