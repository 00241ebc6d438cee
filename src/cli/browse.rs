use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use super::root::open_store;
use crate::catalog::{Course, CourseFilter};
use crate::config::Config;
use crate::pager::{ControllerOptions, LoadStatus, PageSlot, PageState, PageWindow, PagedCollectionController};

/// Filter flags shared by commands that list courses
#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Branch, e.g. Pasig
    #[arg(long)]
    pub branch: Option<String>,

    /// Program, e.g. "Short Courses"
    #[arg(long)]
    pub program: Option<String>,

    /// Technology within the chosen program
    #[arg(long)]
    pub technology: Option<String>,

    /// Short, Medium or Long
    #[arg(long)]
    pub duration: Option<String>,

    /// Price range, e.g. 0-5000, 5001-10000, 10001+
    #[arg(long)]
    pub price: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> Result<CourseFilter> {
        let mut filter = CourseFilter::default();
        if let Some(branch) = &self.branch {
            filter.set_branch(branch)?;
        }
        // Program first: choosing it resets the technology
        if let Some(program) = &self.program {
            filter.set_program(program)?;
        }
        if let Some(technology) = &self.technology {
            filter.set_technology(technology)?;
        }
        if let Some(duration) = &self.duration {
            filter.set_duration(duration)?;
        }
        if let Some(price) = &self.price {
            filter.set_price(price)?;
        }
        Ok(filter)
    }
}

/// Show a page of courses
#[derive(Args, Debug)]
pub struct BrowseCommand {
    /// Page to show, starting at 1
    #[arg(short = 'p', long = "page", default_value_t = 1)]
    pub page: usize,

    /// Keep running and redraw whenever the catalog changes
    #[arg(short = 'w', long = "watch")]
    pub watch: bool,

    /// Print the page as JSON
    #[arg(long = "json")]
    pub json: bool,

    #[command(flatten)]
    pub filters: FilterArgs,
}

impl Default for BrowseCommand {
    fn default() -> Self {
        Self {
            page: 1,
            watch: false,
            json: false,
            filters: FilterArgs::default(),
        }
    }
}

#[derive(Serialize)]
struct BrowseView<'a> {
    #[serde(flatten)]
    page: &'a PageState<Course>,
    total_pages: usize,
    showing: Option<(usize, usize)>,
    matching: Vec<&'a Course>,
    pager: Vec<PageSlot>,
}

impl BrowseCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        debug!("Executing browse command");
        let filter = self.filters.to_filter()?;
        let window = PageWindow::new(config.window_delta);

        let store = Arc::new(open_store(config)?);
        let controller = PagedCollectionController::new(
            store,
            ControllerOptions {
                collection: config.collection.clone(),
                page_size: config.page_size,
            },
        );

        controller.start().await;
        if self.page != 1 {
            controller.go_to_page(self.page).await;
        }

        if !self.watch {
            self.print(&controller.snapshot(), &filter, &window)?;
            controller.dispose();
            return Ok(());
        }

        info!("Watching page {} for changes", controller.current_page());
        let mut changes = WatchStream::new(controller.changes());
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, stopping watch");
                    break;
                }
                change = changes.next() => {
                    if change.is_none() {
                        break;
                    }
                    let state = controller.snapshot();
                    if state.is_loading() {
                        continue;
                    }
                    self.print(&state, &filter, &window)?;
                }
            }
        }

        controller.dispose();
        Ok(())
    }

    fn print(&self, state: &PageState<Course>, filter: &CourseFilter, window: &PageWindow) -> Result<()> {
        if self.json {
            let view = BrowseView {
                page: state,
                total_pages: state.display_pages(),
                showing: state.showing_range(),
                matching: state.items.iter().filter(|c| filter.matches(c)).collect(),
                pager: window.slots(state.current_page, state.display_pages()),
            };
            println!("{}", serde_json::to_string_pretty(&view)?);
        } else {
            println!("{}", render_page(state, filter, window));
        }
        Ok(())
    }
}

/// Plain-text rendering of a page, its summary and its pager
pub fn render_page(state: &PageState<Course>, filter: &CourseFilter, window: &PageWindow) -> String {
    let mut out = Vec::new();

    let live = if state.live { "live" } else { "offline" };
    out.push(format!(
        "Courses - page {} of {} [{}]",
        state.current_page,
        state.display_pages(),
        live
    ));

    match state.showing_range() {
        Some((first, last)) => out.push(format!(
            "Showing {} to {} of {} courses",
            first, last, state.total_count
        )),
        None if state.is_stale() => out.push(format!(
            "Page {} is past the end of the catalog ({} courses)",
            state.current_page, state.total_count
        )),
        None => out.push("No courses".to_string()),
    }

    if let LoadStatus::Failed(reason) = &state.status {
        out.push(format!("! {} (showing last loaded data)", reason));
    }

    let offset = state.current_page.saturating_sub(1).saturating_mul(state.page_size);
    let mut shown = 0;
    for (i, course) in state.items.iter().enumerate() {
        if !filter.matches(course) {
            continue;
        }
        shown += 1;
        out.push(format!(
            "{:>4}. {} | {} | {} / {} | {} | {}  ({})",
            offset.saturating_add(i + 1),
            course.title,
            course.branch,
            course.program,
            course.technology,
            course.duration,
            course.price_label(),
            course.id
        ));
    }

    if !filter.is_empty() {
        out.push(format!(
            "Filters active: {} of {} courses on this page match",
            shown,
            state.items.len()
        ));
    }

    let pager = render_pager(&window.slots(state.current_page, state.display_pages()), state.current_page);
    if !pager.is_empty() {
        out.push(pager);
    }

    out.join("\n")
}

/// `< 1 ... 4 [5] 6 ... 10 >` style pager line; empty when there is no pager
pub fn render_pager(slots: &[PageSlot], current: usize) -> String {
    if slots.is_empty() {
        return String::new();
    }
    let body: Vec<String> = slots
        .iter()
        .map(|slot| match slot {
            PageSlot::Page(page) if *page == current => format!("[{}]", page),
            other => other.to_string(),
        })
        .collect();
    format!("< {} >", body.join(" "))
}
