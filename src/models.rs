use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TrackerError};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationStatus {
    #[default]
    Wishlist,
    Applied,
    Interviewing,
    Offer,
    Rejected,
}

impl ApplicationStatus {
    /// Board order, left to right.
    pub const ALL: [ApplicationStatus; 5] = [
        ApplicationStatus::Wishlist,
        ApplicationStatus::Applied,
        ApplicationStatus::Interviewing,
        ApplicationStatus::Offer,
        ApplicationStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Wishlist => "WISHLIST",
            ApplicationStatus::Applied => "APPLIED",
            ApplicationStatus::Interviewing => "INTERVIEWING",
            ApplicationStatus::Offer => "OFFER",
            ApplicationStatus::Rejected => "REJECTED",
        }
    }

    pub fn column_index(&self) -> usize {
        match self {
            ApplicationStatus::Wishlist => 0,
            ApplicationStatus::Applied => 1,
            ApplicationStatus::Interviewing => 2,
            ApplicationStatus::Offer => 3,
            ApplicationStatus::Rejected => 4,
        }
    }

    pub fn column(&self) -> &'static KanbanColumn {
        &KANBAN_COLUMNS[self.column_index()]
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WISHLIST" => Ok(ApplicationStatus::Wishlist),
            "APPLIED" => Ok(ApplicationStatus::Applied),
            "INTERVIEWING" => Ok(ApplicationStatus::Interviewing),
            "OFFER" => Ok(ApplicationStatus::Offer),
            "REJECTED" => Ok(ApplicationStatus::Rejected),
            other => Err(format!(
                "unknown status '{}' (expected wishlist, applied, interviewing, offer, rejected)",
                other.to_lowercase()
            )),
        }
    }
}

/// Static board column configuration. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KanbanColumn {
    pub status: ApplicationStatus,
    pub title: &'static str,
    pub color: &'static str,
}

pub const KANBAN_COLUMNS: [KanbanColumn; 5] = [
    KanbanColumn { status: ApplicationStatus::Wishlist, title: "Wishlist", color: "gray" },
    KanbanColumn { status: ApplicationStatus::Applied, title: "Applied", color: "blue" },
    KanbanColumn { status: ApplicationStatus::Interviewing, title: "Interviewing", color: "yellow" },
    KanbanColumn { status: ApplicationStatus::Offer, title: "Offer", color: "green" },
    KanbanColumn { status: ApplicationStatus::Rejected, title: "Rejected", color: "red" },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub user_id: String,
    pub company_name: String,
    pub job_title: String,
    pub status: ApplicationStatus,
    pub job_url: Option<String>,
    pub location: Option<String>,
    pub applied_date: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
    pub tags: Vec<String>,
    pub interview_date: Option<NaiveDate>,
    pub interview_time: Option<NaiveTime>,
    pub created_at: String,
    pub last_updated: String,
}

impl Application {
    /// Interview slot is shown once the application is interviewing or a date was already set.
    pub fn shows_interview(&self) -> bool {
        self.status == ApplicationStatus::Interviewing || self.interview_date.is_some()
    }

    /// `YYYY-MM-DD HH:MM` as far as it is known, or `None` when not shown.
    pub fn interview_slot(&self) -> Option<String> {
        if !self.shows_interview() {
            return None;
        }
        Some(match (self.interview_date, self.interview_time) {
            (Some(date), Some(time)) => format!("{} {}", date, time.format("%H:%M")),
            (Some(date), None) => date.to_string(),
            (None, Some(time)) => time.format("%H:%M").to_string(),
            (None, None) => "not scheduled".to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub application_id: String,
    pub content: String,
    pub created_at: String,
}

/// Payload of a status mutation. A `None` reason leaves the stored reason untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: String,
    pub status: ApplicationStatus,
    pub rejection_reason: Option<String>,
}

impl StatusChange {
    pub fn new(id: impl Into<String>, status: ApplicationStatus) -> Self {
        Self {
            id: id.into(),
            status,
            rejection_reason: None,
        }
    }

    pub fn rejected(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ApplicationStatus::Rejected,
            rejection_reason: Some(reason.into()),
        }
    }
}

/// Field selection for an update. Outer `None` means "leave as is"; for the
/// optional columns `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationPatch {
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub status: Option<ApplicationStatus>,
    pub job_url: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub applied_date: Option<Option<NaiveDate>>,
    pub rejection_reason: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub interview_date: Option<Option<NaiveDate>>,
    pub interview_time: Option<Option<NaiveTime>>,
}

impl ApplicationPatch {
    pub fn apply_to(&self, app: &mut Application) {
        if let Some(company_name) = &self.company_name {
            app.company_name = company_name.clone();
        }
        if let Some(job_title) = &self.job_title {
            app.job_title = job_title.clone();
        }
        if let Some(status) = self.status {
            app.status = status;
        }
        if let Some(job_url) = &self.job_url {
            app.job_url = job_url.clone();
        }
        if let Some(location) = &self.location {
            app.location = location.clone();
        }
        if let Some(applied_date) = self.applied_date {
            app.applied_date = applied_date;
        }
        if let Some(reason) = &self.rejection_reason {
            app.rejection_reason = reason.clone();
        }
        if let Some(tags) = &self.tags {
            app.tags = tags.clone();
        }
        if let Some(interview_date) = self.interview_date {
            app.interview_date = interview_date;
        }
        if let Some(interview_time) = self.interview_time {
            app.interview_time = interview_time;
        }
    }
}

impl From<&StatusChange> for ApplicationPatch {
    fn from(change: &StatusChange) -> Self {
        ApplicationPatch {
            status: Some(change.status),
            rejection_reason: change.rejection_reason.clone().map(Some),
            ..Default::default()
        }
    }
}

/// Raw add/edit form input, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationDraft {
    pub company_name: String,
    pub job_title: String,
    pub status: ApplicationStatus,
    pub job_url: Option<String>,
    pub location: Option<String>,
    pub applied_date: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
    pub tags_input: String,
    pub interview_date: Option<NaiveDate>,
    pub interview_time: Option<NaiveTime>,
}

/// A draft that passed validation: required fields are non-empty and every
/// blank optional field is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationFields {
    pub company_name: String,
    pub job_title: String,
    pub status: ApplicationStatus,
    pub job_url: Option<String>,
    pub location: Option<String>,
    pub applied_date: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
    pub tags: Vec<String>,
    pub interview_date: Option<NaiveDate>,
    pub interview_time: Option<NaiveTime>,
}

impl ApplicationDraft {
    pub fn validate(&self) -> Result<ApplicationFields> {
        let company_name = self.company_name.trim();
        if company_name.is_empty() {
            return Err(TrackerError::Validation("company name is required".into()));
        }
        let job_title = self.job_title.trim();
        if job_title.is_empty() {
            return Err(TrackerError::Validation("job title is required".into()));
        }

        Ok(ApplicationFields {
            company_name: company_name.to_string(),
            job_title: job_title.to_string(),
            status: self.status,
            job_url: non_blank(self.job_url.as_deref()),
            location: non_blank(self.location.as_deref()),
            applied_date: self.applied_date,
            rejection_reason: non_blank(self.rejection_reason.as_deref()),
            tags: parse_tags(&self.tags_input),
            interview_date: self.interview_date,
            interview_time: self.interview_time,
        })
    }
}

impl From<&Application> for ApplicationDraft {
    fn from(app: &Application) -> Self {
        ApplicationDraft {
            company_name: app.company_name.clone(),
            job_title: app.job_title.clone(),
            status: app.status,
            job_url: app.job_url.clone(),
            location: app.location.clone(),
            applied_date: app.applied_date,
            rejection_reason: app.rejection_reason.clone(),
            tags_input: app.tags.join(", "),
            interview_date: app.interview_date,
            interview_time: app.interview_time,
        }
    }
}

impl From<&ApplicationFields> for ApplicationPatch {
    fn from(fields: &ApplicationFields) -> Self {
        ApplicationPatch {
            company_name: Some(fields.company_name.clone()),
            job_title: Some(fields.job_title.clone()),
            status: Some(fields.status),
            job_url: Some(fields.job_url.clone()),
            location: Some(fields.location.clone()),
            applied_date: Some(fields.applied_date),
            rejection_reason: Some(fields.rejection_reason.clone()),
            tags: Some(fields.tags.clone()),
            interview_date: Some(fields.interview_date),
            interview_time: Some(fields.interview_time),
        }
    }
}

/// Splits a comma-separated tag list. Keeps first-seen order, drops blanks and repeats.
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|existing| existing == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Form-style date input: blank means "not set".
pub fn parse_optional_date(input: &str) -> Result<Option<NaiveDate>> {
    let Some(value) = non_blank(Some(input)) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| {
            TrackerError::Validation(format!("invalid date '{}' (expected YYYY-MM-DD)", value))
        })
}

/// Form-style time input (`HH:MM`, seconds optional): blank means "not set".
pub fn parse_optional_time(input: &str) -> Result<Option<NaiveTime>> {
    let Some(value) = non_blank(Some(input)) else {
        return Ok(None);
    };
    NaiveTime::parse_from_str(&value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&value, "%H:%M:%S"))
        .map(Some)
        .map_err(|_| {
            TrackerError::Validation(format!("invalid time '{}' (expected HH:MM)", value))
        })
}

/// Trims note content; blank content never reaches the store.
pub fn validate_note_content(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::Validation("note content is empty".into()));
    }
    Ok(trimmed.to_string())
}

/// RFC 3339 UTC with microseconds; sorts lexicographically in time order.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
