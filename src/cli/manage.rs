use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use clap::Args;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use super::root::open_store;
use crate::catalog::filters::{self, technologies_for, BRANCHES, PROGRAMS};
use crate::catalog::{Course, CourseFilter, DurationBand, PriceRange};
use crate::config::Config;

/// Add a course
#[derive(Args, Debug)]
pub struct AddCommand {
    /// Course title
    pub title: String,

    #[arg(long)]
    pub branch: String,

    #[arg(long)]
    pub program: String,

    #[arg(long)]
    pub technology: String,

    /// Short, Medium or Long
    #[arg(long, default_value = "short")]
    pub duration: String,

    /// Price in whole pesos
    #[arg(long)]
    pub price: u32,

    #[arg(long, default_value = "")]
    pub description: String,
}

impl AddCommand {
    pub fn execute(&self, config: &Config) -> Result<()> {
        debug!("Executing add command");
        let course = self.to_course()?;
        open_store(config)?.insert(&course)?;
        info!("Added course {}", course.id);
        println!("{}", course.id);
        Ok(())
    }

    /// Build the course, normalising facets against the taxonomy
    fn to_course(&self) -> Result<Course> {
        let mut facets = CourseFilter::default();
        facets.set_branch(&self.branch)?;
        facets.set_program(&self.program)?;
        facets.set_technology(&self.technology)?;

        let (Some(branch), Some(program), Some(technology)) =
            (facets.branch, facets.program, facets.technology)
        else {
            return Err(anyhow!("branch, program and technology must name a specific option"));
        };
        let duration: DurationBand = self.duration.parse().map_err(|e: String| anyhow!(e))?;

        Ok(Course::new(&self.title, branch, program, technology, duration, self.price)
            .with_description(&self.description))
    }
}

/// Change an existing course
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Id of the course to change
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub price: Option<u32>,

    #[arg(long)]
    pub duration: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

impl UpdateCommand {
    pub fn execute(&self, config: &Config) -> Result<()> {
        debug!("Executing update command");
        let store = open_store(config)?;
        let mut course = store
            .get(&self.id)?
            .ok_or_else(|| anyhow!("No course with id {}", self.id))?;

        if let Some(title) = &self.title {
            course.title = title.clone();
        }
        if let Some(price) = self.price {
            course.price = price;
        }
        if let Some(duration) = &self.duration {
            course.duration = duration.parse().map_err(|e: String| anyhow!(e))?;
        }
        if let Some(description) = &self.description {
            course.description = description.clone();
        }

        store.update(&course)?;
        info!("Updated course {}", course.id);
        Ok(())
    }
}

/// Remove a course
#[derive(Args, Debug)]
pub struct RemoveCommand {
    /// Id of the course to remove
    pub id: String,
}

impl RemoveCommand {
    pub fn execute(&self, config: &Config) -> Result<()> {
        debug!("Executing remove command");
        if !open_store(config)?.delete(&self.id)? {
            return Err(anyhow!("No course with id {}", self.id));
        }
        info!("Removed course {}", self.id);
        Ok(())
    }
}

/// Insert sample courses
#[derive(Args, Debug)]
pub struct SeedCommand {
    /// How many courses to insert
    #[arg(short = 'n', long = "count", default_value_t = 25)]
    pub count: usize,
}

const TITLE_SUFFIXES: &[&str] = &["Fundamentals", "Essentials", "Workshop", "Bootcamp", "Masterclass"];

impl SeedCommand {
    pub fn execute(&self, config: &Config) -> Result<()> {
        debug!("Executing seed command");
        let store = open_store(config)?;
        let mut rng = rand::thread_rng();

        for course in sample_courses(&mut rng, self.count) {
            store.insert(&course)?;
        }
        info!("Seeded {} courses", self.count);
        println!("Inserted {} sample courses", self.count);
        Ok(())
    }
}

/// `count` plausible courses, the first one being the newest
fn sample_courses<R: Rng>(rng: &mut R, count: usize) -> Vec<Course> {
    let now = Utc::now();
    (0..count)
        .filter_map(|i| {
            let branch = BRANCHES.choose(rng)?;
            let program = PROGRAMS.choose(rng)?;
            let technology = technologies_for(program).choose(rng)?;
            let duration = *DurationBand::ALL.choose(rng)?;
            let suffix = TITLE_SUFFIXES.choose(rng)?;
            let price = rng.gen_range(2..=40) * 500;

            let mut course = Course::new(
                format!("{} {}", technology, suffix),
                *branch,
                *program,
                *technology,
                duration,
                price,
            );
            course.created_at = now - Duration::seconds(i as i64);
            Some(course)
        })
        .collect()
}

/// List the filter options
#[derive(Args, Debug)]
pub struct FiltersCommand;

impl FiltersCommand {
    pub fn execute(&self) -> Result<()> {
        println!("Branches: {}", BRANCHES.join(", "));
        println!("Durations: {}", DurationBand::ALL.map(|d| d.label()).join(", "));
        println!(
            "Price ranges: {}",
            PriceRange::ALL.map(|p| p.label()).join(", ")
        );
        println!("Programs:");
        for program in PROGRAMS {
            println!("  {}", program);
            println!("    {}", technologies_for(program).join(", "));
        }
        println!("Use \"{}\" for any facet to leave it unfiltered.", filters::ALL);
        Ok(())
    }
}
