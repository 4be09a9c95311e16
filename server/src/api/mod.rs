//! API endpoints for the CDK service.
//!
//! - Projects: create, detail, update, delete, report
//! - Listings: explore, own projects, tags, receivers, claim history and chart
//! - Receive: claim one item from a project

pub mod listings;
pub mod projects;
pub mod receive;

pub use listings::{
    list_my_projects, list_projects, list_received, list_receivers, list_tags, received_chart,
};
pub use projects::{create_project, delete_project, get_project, report_project, update_project};
pub use receive::receive_item;
