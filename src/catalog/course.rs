use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::remote::Record;

/// How long a course runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationBand {
    Short,
    Medium,
    Long,
}

impl DurationBand {
    pub const ALL: [DurationBand; 3] = [DurationBand::Short, DurationBand::Medium, DurationBand::Long];

    pub fn label(self) -> &'static str {
        match self {
            DurationBand::Short => "Short",
            DurationBand::Medium => "Medium",
            DurationBand::Long => "Long",
        }
    }
}

impl fmt::Display for DurationBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DurationBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(DurationBand::Short),
            "medium" => Ok(DurationBand::Medium),
            "long" => Ok(DurationBand::Long),
            other => Err(format!("unknown duration: {}", other)),
        }
    }
}

/// A course offered in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub branch: String,
    pub program: String,
    pub technology: String,
    pub duration: DurationBand,
    /// Whole pesos
    pub price: u32,
    pub created_at: DateTime<Utc>,
}

impl Course {
    pub fn new(
        title: impl Into<String>,
        branch: impl Into<String>,
        program: impl Into<String>,
        technology: impl Into<String>,
        duration: DurationBand,
        price: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: String::new(),
            branch: branch.into(),
            program: program.into(),
            technology: technology.into(),
            duration,
            price,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Price formatted as pesos with thousands separators, e.g. `₱10,500`
    pub fn price_label(&self) -> String {
        let digits = self.price.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        format!("₱{}", grouped)
    }

    #[cfg(test)]
    pub(crate) fn sample(title: &str) -> Self {
        Self::new(
            title,
            "Pasig",
            "Short Courses",
            "Linux",
            DurationBand::Short,
            4_500,
        )
    }
}

impl Record for Course {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_label_groups_thousands() {
        let mut course = Course::sample("Databases");
        course.price = 0;
        assert_eq!(course.price_label(), "₱0");
        course.price = 950;
        assert_eq!(course.price_label(), "₱950");
        course.price = 10_500;
        assert_eq!(course.price_label(), "₱10,500");
        course.price = 1_234_567;
        assert_eq!(course.price_label(), "₱1,234,567");
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!("Short".parse::<DurationBand>(), Ok(DurationBand::Short));
        assert_eq!(" long ".parse::<DurationBand>(), Ok(DurationBand::Long));
        assert!("forever".parse::<DurationBand>().is_err());
    }

    #[test]
    fn test_course_serializes_duration_lowercase() {
        let course = Course::sample("Cyber Security").with_description("Intro");
        let json = serde_json::to_value(&course).unwrap();
        assert_eq!(json["duration"], "short");
        assert_eq!(json["description"], "Intro");

        let back: Course = serde_json::from_value(json).unwrap();
        assert_eq!(back, course);
    }
}
