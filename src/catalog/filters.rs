//! Filter taxonomy for the course catalog
//!
//! Each facet accepts `"All"` to mean "no constraint". The technology facet
//! only exists once a specific program is chosen, and switching programs
//! resets it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::course::{Course, DurationBand};

pub const ALL: &str = "All";

pub const BRANCHES: &[&str] = &["Pasig", "Pasay", "Jalajala"];

pub const PROGRAMS: &[&str] = &["2-Year Program", "Senior High", "Short Courses"];

const TWO_YEAR_TECHNOLOGIES: &[&str] = &[
    "Information Technology",
    "Network System & Security Administrator",
    "Automotive Technology",
    "Industrial Electrical Technology",
    "Industrial Automation & Manufacturing Technology",
    "Semiconductor & Manufacturing Technology",
    "Advanced Industrial Training Program",
];

const SENIOR_HIGH_TECHNOLOGIES: &[&str] = &["Computer Programming", "Mechatronics Servicing"];

const SHORT_COURSE_TECHNOLOGIES: &[&str] = &[
    "Agriculture",
    "Automotive and Motorcycle Servicing",
    "CISCO Networking",
    "Computer-Aided Design",
    "Cyber Security",
    "Databases",
    "Digital Arts and Design",
    "Electrical",
    "Electronics",
    "Linux",
    "Machine Automation and Instrumentation (Mechatronics)",
    "Maritime-Electrotechnical",
    "Metal Trades-Welding and Pipefitting",
    "Office Productivity",
    "Process Automation (Instrumentation and Control)",
    "Programming",
    "Refrigeration and Air-conditioning Mechanic",
    "Soft Skills",
    "Web Development",
];

/// Technologies offered under `program`; empty for unknown programs
pub fn technologies_for(program: &str) -> &'static [&'static str] {
    match program {
        "2-Year Program" => TWO_YEAR_TECHNOLOGIES,
        "Senior High" => SENIOR_HIGH_TECHNOLOGIES,
        "Short Courses" => SHORT_COURSE_TECHNOLOGIES,
        _ => &[],
    }
}

/// Price buckets shown in the sidebar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceRange {
    UpTo5k,
    From5kTo10k,
    Above10k,
}

impl PriceRange {
    pub const ALL: [PriceRange; 3] = [PriceRange::UpTo5k, PriceRange::From5kTo10k, PriceRange::Above10k];

    pub fn label(self) -> &'static str {
        match self {
            PriceRange::UpTo5k => "₱0-₱5,000",
            PriceRange::From5kTo10k => "₱5,001-₱10,000",
            PriceRange::Above10k => "₱10,001+",
        }
    }

    pub fn contains(self, price: u32) -> bool {
        match self {
            PriceRange::UpTo5k => price <= 5_000,
            PriceRange::From5kTo10k => (5_001..=10_000).contains(&price),
            PriceRange::Above10k => price > 10_000,
        }
    }

    /// Accepts the sidebar label or its plain form (`0-5000`, `5001-10000`, `10001+`)
    pub fn parse(value: &str) -> Option<Self> {
        let plain: String = value
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '+')
            .collect();
        match plain.as_str() {
            "0-5000" => Some(PriceRange::UpTo5k),
            "5001-10000" => Some(PriceRange::From5kTo10k),
            "10001+" => Some(PriceRange::Above10k),
            _ => None,
        }
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("unknown {facet}: {value}")]
    UnknownOption { facet: &'static str, value: String },

    #[error("choose a program before filtering by technology")]
    TechnologyWithoutProgram,
}

/// Active catalog filters; `None` on a facet means "All"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseFilter {
    pub branch: Option<String>,
    pub program: Option<String>,
    pub technology: Option<String>,
    pub duration: Option<DurationBand>,
    pub price: Option<PriceRange>,
}

fn is_all(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(ALL)
}

fn canonical(facet: &'static str, options: &[&'static str], value: &str) -> Result<String, FilterError> {
    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(value.trim()))
        .map(|option| option.to_string())
        .ok_or_else(|| FilterError::UnknownOption {
            facet,
            value: value.to_string(),
        })
}

impl CourseFilter {
    pub fn set_branch(&mut self, value: &str) -> Result<(), FilterError> {
        self.branch = if is_all(value) {
            None
        } else {
            Some(canonical("branch", BRANCHES, value)?)
        };
        Ok(())
    }

    /// Select a program. A different program resets the technology facet.
    pub fn set_program(&mut self, value: &str) -> Result<(), FilterError> {
        let program = if is_all(value) {
            None
        } else {
            Some(canonical("program", PROGRAMS, value)?)
        };
        if program != self.program {
            self.technology = None;
        }
        self.program = program;
        Ok(())
    }

    pub fn set_technology(&mut self, value: &str) -> Result<(), FilterError> {
        if is_all(value) {
            self.technology = None;
            return Ok(());
        }
        let program = self
            .program
            .as_deref()
            .ok_or(FilterError::TechnologyWithoutProgram)?;
        self.technology = Some(canonical("technology", technologies_for(program), value)?);
        Ok(())
    }

    pub fn set_duration(&mut self, value: &str) -> Result<(), FilterError> {
        self.duration = if is_all(value) {
            None
        } else {
            Some(value.parse().map_err(|_| FilterError::UnknownOption {
                facet: "duration",
                value: value.to_string(),
            })?)
        };
        Ok(())
    }

    pub fn set_price(&mut self, value: &str) -> Result<(), FilterError> {
        self.price = if is_all(value) {
            None
        } else {
            Some(PriceRange::parse(value).ok_or_else(|| FilterError::UnknownOption {
                facet: "price range",
                value: value.to_string(),
            })?)
        };
        Ok(())
    }

    /// Technology options for the current program, `"All"` first
    pub fn available_technologies(&self) -> Vec<&'static str> {
        let mut options = vec![ALL];
        if let Some(program) = self.program.as_deref() {
            options.extend_from_slice(technologies_for(program));
        }
        options
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, course: &Course) -> bool {
        let facet = |wanted: &Option<String>, actual: &str| {
            wanted
                .as_deref()
                .map_or(true, |wanted| wanted.eq_ignore_ascii_case(actual))
        };

        facet(&self.branch, &course.branch)
            && facet(&self.program, &course.program)
            && facet(&self.technology, &course.technology)
            && self.duration.map_or(true, |d| d == course.duration)
            && self.price.map_or(true, |p| p.contains(course.price))
    }
}
