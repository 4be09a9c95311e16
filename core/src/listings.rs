//! Read-side queries: explore feed, own projects, tags, receivers, claim
//! history and the daily claim chart.

use crate::error::ProjectError;
use crate::projects::{ProjectService, TAG_MAX_CHARS, char_len, invalid};
use crate::types::{
    DailyClaims, ExploreFilter, Page, Paged, ProjectId, ProjectListing, ReceivedRecord,
    ReceiverRecord, User,
};
use chrono::{Days, NaiveDate};
use std::collections::HashMap;

/// Longest search term accepted on the claim history.
const HISTORY_SEARCH_MAX_CHARS: usize = 255;
/// Longest search term accepted on a receiver list (items may be long).
const RECEIVER_SEARCH_MAX_CHARS: usize = 1024;
/// Widest window the claim chart covers.
pub const MAX_CHART_DAYS: u16 = 180;

/// Page plus optional tag filter for project listings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
    /// Requested page
    pub page: Page,
    /// Keep projects carrying any of these tags (all when empty)
    pub tags: Vec<String>,
}

fn check_page(page: Page) -> Result<(), ProjectError> {
    if page.is_valid() {
        Ok(())
    } else {
        Err(invalid(format!(
            "page must be >= 1 and size 1-{}",
            Page::MAX_SIZE
        )))
    }
}

fn check_query(query: &ListQuery) -> Result<(), ProjectError> {
    check_page(query.page)?;
    match query
        .tags
        .iter()
        .find(|t| t.is_empty() || char_len(t) > TAG_MAX_CHARS)
    {
        Some(tag) => Err(invalid(format!(
            "tag {tag:?} must be 1-{TAG_MAX_CHARS} characters"
        ))),
        None => Ok(()),
    }
}

/// Trimmed search term, `None` when blank.
fn search_term(raw: Option<&str>, max_chars: usize) -> Result<Option<&str>, ProjectError> {
    let Some(term) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if char_len(term) > max_chars {
        return Err(invalid(format!(
            "search must be at most {max_chars} characters"
        )));
    }
    Ok(Some(term))
}

fn chart_label(date: NaiveDate) -> String {
    date.format("%m/%d").to_string()
}

impl ProjectService {
    /// Open projects the viewer may claim from and has not claimed yet,
    /// soonest end first.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::Validation`] on an out-of-range page or bad tag
    /// - [`ProjectError::Storage`] on backend failures
    pub async fn explore(
        &self,
        viewer: &User,
        query: ListQuery,
    ) -> Result<Paged<ProjectListing>, ProjectError> {
        check_query(&query)?;
        let filter = ExploreFilter {
            viewer_id: viewer.id,
            trust_level: viewer.trust_level,
            risk_level: viewer.risk_level(),
            now: self.env.now(),
            tags: query.tags,
        };
        Ok(self
            .env
            .repository
            .explore_projects(&filter, query.page)
            .await?)
    }

    /// Visible projects created by `user`, newest first.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::Validation`] on an out-of-range page or bad tag
    /// - [`ProjectError::Storage`] on backend failures
    pub async fn mine(
        &self,
        user: &User,
        query: ListQuery,
    ) -> Result<Paged<ProjectListing>, ProjectError> {
        check_query(&query)?;
        Ok(self
            .env
            .repository
            .creator_projects(user.id, &query.tags, query.page)
            .await?)
    }

    /// Tags used by visible projects.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::Storage`] on backend failures.
    pub async fn tags(&self) -> Result<Vec<String>, ProjectError> {
        Ok(self.env.repository.active_tags().await?)
    }

    /// Who claimed what from a project. Only its creator may look.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::NotFound`] if the project is missing, hidden or in violation
    /// - [`ProjectError::Forbidden`] if the caller is not the creator
    /// - [`ProjectError::Validation`] on an out-of-range page or search term
    /// - [`ProjectError::Storage`] on backend failures
    pub async fn receivers(
        &self,
        editor: &User,
        project_id: &ProjectId,
        search: Option<&str>,
        page: Page,
    ) -> Result<Paged<ReceiverRecord>, ProjectError> {
        check_page(page)?;
        let search = search_term(search, RECEIVER_SEARCH_MAX_CHARS)?;
        self.owned_project(editor, project_id).await?;
        Ok(self
            .env
            .repository
            .project_receivers(project_id, search, page)
            .await?)
    }

    /// The caller's claimed items, newest first.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::Validation`] on an out-of-range page or search term
    /// - [`ProjectError::Storage`] on backend failures
    pub async fn received_history(
        &self,
        user: &User,
        search: Option<&str>,
        page: Page,
    ) -> Result<Paged<ReceivedRecord>, ProjectError> {
        check_page(page)?;
        let search = search_term(search, HISTORY_SEARCH_MAX_CHARS)?;
        Ok(self
            .env
            .repository
            .received_history(user.id, search, page)
            .await?)
    }

    /// Claims per day over the last `days` UTC days, today included, oldest
    /// first. Days without claims report zero.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::Validation`] unless `days` is 1-[`MAX_CHART_DAYS`]
    /// - [`ProjectError::Storage`] on backend failures
    pub async fn received_chart(
        &self,
        user: &User,
        days: u16,
    ) -> Result<Vec<DailyClaims>, ProjectError> {
        if days == 0 || days > MAX_CHART_DAYS {
            return Err(invalid(format!("day must be 1-{MAX_CHART_DAYS}")));
        }

        let today = self.env.now().date_naive();
        let span = Days::new(u64::from(days - 1));
        let first = today
            .checked_sub_days(span)
            .ok_or_else(|| invalid("chart window out of range"))?;
        let tomorrow = today
            .checked_add_days(Days::new(1))
            .ok_or_else(|| invalid("chart window out of range"))?;

        let counts: HashMap<NaiveDate, u64> = self
            .env
            .repository
            .daily_claim_counts(
                user.id,
                first.and_time(chrono::NaiveTime::MIN).and_utc(),
                tomorrow.and_time(chrono::NaiveTime::MIN).and_utc(),
            )
            .await?
            .into_iter()
            .collect();

        Ok(first
            .iter_days()
            .take(usize::from(days))
            .map(|date| DailyClaims {
                date,
                label: chart_label(date),
                count: counts.get(&date).copied().unwrap_or(0),
            })
            .collect())
    }
}
