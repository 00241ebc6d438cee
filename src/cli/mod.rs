mod browse;
mod manage;
mod root;

pub use browse::{render_page, render_pager, BrowseCommand, FilterArgs};
pub use manage::{AddCommand, FiltersCommand, RemoveCommand, SeedCommand, UpdateCommand};
pub use root::{Cli, Commands};
