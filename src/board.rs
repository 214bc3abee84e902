//! Pure projections of the cached application list: the Kanban board and the
//! sortable list view. Nothing here owns state.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::models::{Application, ApplicationStatus, KanbanColumn, KANBAN_COLUMNS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Newest => ordering.reverse(),
            SortOrder::Oldest => ordering,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Newest => "newest",
            SortOrder::Oldest => "oldest",
        })
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            other => Err(format!("unknown sort order '{}' (expected newest or oldest)", other)),
        }
    }
}

/// Single-select company and location filters, AND-combined. Empty means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardFilter {
    pub company: String,
    pub location: String,
    pub sort_order: SortOrder,
}

impl BoardFilter {
    pub fn matches(&self, app: &Application) -> bool {
        if !self.company.is_empty() && app.company_name != self.company {
            return false;
        }
        if !self.location.is_empty() && app.location.as_deref() != Some(self.location.as_str()) {
            return false;
        }
        true
    }

    pub fn is_default(&self) -> bool {
        *self == BoardFilter::default()
    }

    pub fn clear(&mut self) {
        *self = BoardFilter::default();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardColumn {
    pub config: KanbanColumn,
    pub applications: Vec<Application>,
}

impl BoardColumn {
    pub fn count(&self) -> usize {
        self.applications.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardView {
    pub columns: Vec<BoardColumn>,
    pub companies: Vec<String>,
    pub locations: Vec<String>,
}

impl BoardView {
    pub fn column(&self, status: ApplicationStatus) -> &BoardColumn {
        &self.columns[status.column_index()]
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(BoardColumn::count).sum()
    }
}

/// Filter, sort by applied date, then split into the five status columns.
pub fn project_board(applications: &[Application], filter: &BoardFilter) -> BoardView {
    let mut visible = filter_applications(applications, filter);
    sort_by_applied_date(&mut visible, filter.sort_order);

    let mut columns: Vec<BoardColumn> = KANBAN_COLUMNS
        .iter()
        .map(|config| BoardColumn {
            config: *config,
            applications: Vec::new(),
        })
        .collect();
    for app in visible {
        columns[app.status.column_index()].applications.push(app);
    }

    BoardView {
        columns,
        companies: unique_companies(applications),
        locations: unique_locations(applications),
    }
}

pub fn filter_applications(applications: &[Application], filter: &BoardFilter) -> Vec<Application> {
    applications
        .iter()
        .filter(|app| filter.matches(app))
        .cloned()
        .collect()
}

/// Applications without an applied date keep their positions. Dated ones are
/// stably sorted among the slots dated applications already occupy, so a
/// list with no dates comes back unchanged.
pub fn sort_by_applied_date(applications: &mut [Application], order: SortOrder) {
    let slots: Vec<usize> = applications
        .iter()
        .enumerate()
        .filter(|(_, app)| app.applied_date.is_some())
        .map(|(i, _)| i)
        .collect();

    let mut dated: Vec<Application> = slots.iter().map(|&i| applications[i].clone()).collect();
    dated.sort_by(|a, b| order.apply(a.applied_date.cmp(&b.applied_date)));

    for (slot, app) in slots.into_iter().zip(dated) {
        applications[slot] = app;
    }
}

pub fn unique_companies(applications: &[Application]) -> Vec<String> {
    facet(applications.iter().map(|app| app.company_name.as_str()))
}

pub fn unique_locations(applications: &[Application]) -> Vec<String> {
    facet(applications.iter().filter_map(|app| app.location.as_deref()))
}

fn facet<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

// --- List view ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Company,
    JobTitle,
    Status,
    Location,
    AppliedDate,
    CreatedAt,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "company" => Ok(SortKey::Company),
            "title" | "job_title" => Ok(SortKey::JobTitle),
            "status" => Ok(SortKey::Status),
            "location" => Ok(SortKey::Location),
            "applied" | "applied_date" => Ok(SortKey::AppliedDate),
            "created" | "created_at" => Ok(SortKey::CreatedAt),
            other => Err(format!(
                "unknown sort key '{}' (expected company, title, status, location, applied, created)",
                other
            )),
        }
    }
}

/// Explicit column sort for the list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSort {
    pub key: SortKey,
    pub ascending: bool,
}

/// List view: same filters as the board, ordered by `created_at` per the
/// filter's sort order unless a column sort is chosen. Missing values sort last
/// in either direction.
pub fn project_list(
    applications: &[Application],
    filter: &BoardFilter,
    column: Option<ColumnSort>,
) -> Vec<Application> {
    let mut visible = filter_applications(applications, filter);
    match column {
        None => visible.sort_by(|a, b| filter.sort_order.apply(a.created_at.cmp(&b.created_at))),
        Some(ColumnSort { key, ascending }) => visible.sort_by(|a, b| {
            let direction = |o: Ordering| if ascending { o } else { o.reverse() };
            match key {
                SortKey::Company => direction(a.company_name.cmp(&b.company_name)),
                SortKey::JobTitle => direction(a.job_title.cmp(&b.job_title)),
                SortKey::Status => {
                    direction(a.status.column_index().cmp(&b.status.column_index()))
                }
                SortKey::Location => absent_last(&a.location, &b.location, direction),
                SortKey::AppliedDate => absent_last(&a.applied_date, &b.applied_date, direction),
                SortKey::CreatedAt => direction(a.created_at.cmp(&b.created_at)),
            }
        }),
    }
    visible
}

fn absent_last<T: Ord>(a: &Option<T>, b: &Option<T>, direction: impl Fn(Ordering) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => direction(a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn app(id: &str, company: &str, location: Option<&str>, status: ApplicationStatus, applied: Option<(i32, u32, u32)>) -> Application {
        Application {
            id: id.into(),
            user_id: "u1".into(),
            company_name: company.into(),
            job_title: format!("{} role", id),
            status,
            job_url: None,
            location: location.map(str::to_string),
            applied_date: applied.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            rejection_reason: None,
            interview_date: None,
            interview_time: None,
            tags: vec![],
            created_at: format!("2024-01-0{}T00:00:00Z", id.trim_start_matches('a')),
            last_updated: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn ids(apps: &[Application]) -> Vec<&str> {
        apps.iter().map(|a| a.id.as_str()).collect()
    }

    fn sample() -> Vec<Application> {
        use ApplicationStatus::*;
        vec![
            app("a1", "Acme", Some("Berlin"), Wishlist, Some((2024, 3, 1))),
            app("a2", "Globex", Some("Remote"), Applied, Some((2024, 1, 15))),
            app("a3", "Acme", Some("Remote"), Interviewing, None),
            app("a4", "Initech", None, Applied, Some((2024, 2, 10))),
            app("a5", "Acme", Some("Remote"), Rejected, Some((2023, 12, 1))),
        ]
    }

    #[test]
    fn filters_commute() {
        let apps = sample();
        let company = BoardFilter { company: "Acme".into(), ..Default::default() };
        let location = BoardFilter { location: "Remote".into(), ..Default::default() };

        let a = filter_applications(&filter_applications(&apps, &company), &location);
        let b = filter_applications(&filter_applications(&apps, &location), &company);
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(ids(&a), vec!["a3", "a5"]);

        let both = BoardFilter { company: "Acme".into(), location: "Remote".into(), ..Default::default() };
        assert_eq!(ids(&filter_applications(&apps, &both)), vec!["a3", "a5"]);
    }

    #[test]
    fn location_filter_excludes_missing_location() {
        let apps = sample();
        let filter = BoardFilter { location: "Berlin".into(), ..Default::default() };
        assert_eq!(ids(&filter_applications(&apps, &filter)), vec!["a1"]);
    }

    #[test]
    fn sort_without_dates_is_identity() {
        let mut apps: Vec<Application> = sample()
            .into_iter()
            .map(|mut a| {
                a.applied_date = None;
                a
            })
            .collect();
        let before = ids(&apps).iter().map(|s| s.to_string()).collect::<Vec<_>>();
        sort_by_applied_date(&mut apps, SortOrder::Newest);
        assert_eq!(ids(&apps), before);
        sort_by_applied_date(&mut apps, SortOrder::Oldest);
        assert_eq!(ids(&apps), before);
    }

    #[test]
    fn undated_keep_their_slot_while_dated_sort() {
        let mut apps = sample();
        sort_by_applied_date(&mut apps, SortOrder::Newest);
        assert_eq!(ids(&apps), vec!["a1", "a4", "a3", "a2", "a5"]);

        sort_by_applied_date(&mut apps, SortOrder::Oldest);
        assert_eq!(ids(&apps), vec!["a5", "a2", "a3", "a4", "a1"]);
    }

    #[test]
    fn grouping_is_complete_and_disjoint() {
        let apps = sample();
        let filter = BoardFilter { company: "Acme".into(), ..Default::default() };
        let board = project_board(&apps, &filter);

        assert_eq!(board.columns.len(), 5);
        let mut seen: Vec<&str> = board
            .columns
            .iter()
            .flat_map(|c| c.applications.iter().map(|a| a.id.as_str()))
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["a1", "a3", "a5"]);
        for column in &board.columns {
            assert!(column.applications.iter().all(|a| a.status == column.config.status));
        }
        assert_eq!(board.total(), 3);
    }

    #[test]
    fn columns_preserve_sorted_order() {
        let apps = sample();
        let board = project_board(&apps, &BoardFilter::default());
        assert_eq!(ids(&board.column(ApplicationStatus::Applied).applications), vec!["a4", "a2"]);

        let oldest = BoardFilter { sort_order: SortOrder::Oldest, ..Default::default() };
        let board = project_board(&apps, &oldest);
        assert_eq!(ids(&board.column(ApplicationStatus::Applied).applications), vec!["a2", "a4"]);
    }

    #[test]
    fn facets_come_from_all_applications() {
        let apps = sample();
        let filter = BoardFilter { company: "Globex".into(), ..Default::default() };
        let board = project_board(&apps, &filter);
        assert_eq!(board.companies, vec!["Acme", "Globex", "Initech"]);
        assert_eq!(board.locations, vec!["Berlin", "Remote"]);
    }

    #[test]
    fn clear_resets_filter() {
        let mut filter = BoardFilter { company: "Acme".into(), location: "Remote".into(), sort_order: SortOrder::Oldest };
        assert!(!filter.is_default());
        filter.clear();
        assert!(filter.is_default());
    }

    #[test]
    fn list_defaults_to_created_at() {
        let apps = sample();
        let list = project_list(&apps, &BoardFilter::default(), None);
        assert_eq!(ids(&list), vec!["a5", "a4", "a3", "a2", "a1"]);
    }

    #[test]
    fn list_column_sort_puts_missing_last() {
        let apps = sample();
        let sort = ColumnSort { key: SortKey::Location, ascending: false };
        let list = project_list(&apps, &BoardFilter::default(), Some(sort));
        assert_eq!(list.last().map(|a| a.id.as_str()), Some("a4"));
        assert_eq!(list[0].location.as_deref(), Some("Remote"));

        let sort = ColumnSort { key: SortKey::Status, ascending: true };
        let list = project_list(&apps, &BoardFilter::default(), Some(sort));
        assert_eq!(list[0].status, ApplicationStatus::Wishlist);
        assert_eq!(list[4].status, ApplicationStatus::Rejected);
    }
}
