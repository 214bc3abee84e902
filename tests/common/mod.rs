#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use applytrack::auth::{AuthEvent, AuthListeners, AuthProvider, Identity, Session};
use applytrack::models::{Application, ApplicationPatch, ApplicationStatus, Note};
use applytrack::store::RemoteStore;
use applytrack::{Result, Tracker, TrackerError};

pub const OWNER: &str = "user-1";

/// Row store held in memory, with switchable write failures.
#[derive(Default)]
pub struct MemoryStore {
    applications: RefCell<Vec<Application>>,
    notes: RefCell<Vec<Note>>,
    failing_writes: Cell<usize>,
    update_calls: Cell<usize>,
    select_calls: Cell<usize>,
    clock: Cell<u32>,
}

impl MemoryStore {
    pub fn seed(&self, app: Application) {
        self.applications.borrow_mut().push(app);
    }

    /// The next `n` writes fail with `RemoteWrite`.
    pub fn fail_writes(&self, n: usize) {
        self.failing_writes.set(n);
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.get()
    }

    pub fn select_calls(&self) -> usize {
        self.select_calls.get()
    }

    pub fn row(&self, id: &str) -> Option<Application> {
        self.applications.borrow().iter().find(|a| a.id == id).cloned()
    }

    pub fn note_count(&self) -> usize {
        self.notes.borrow().len()
    }

    fn check_write(&self) -> Result<()> {
        let remaining = self.failing_writes.get();
        if remaining > 0 {
            self.failing_writes.set(remaining - 1);
            return Err(TrackerError::RemoteWrite("connection reset".into()));
        }
        Ok(())
    }

    fn tick(&self) -> String {
        let n = self.clock.get() + 1;
        self.clock.set(n);
        format!("2030-01-01T00:00:{:02}.000000Z", n)
    }

    fn owns(&self, owner: &str, application_id: &str) -> bool {
        self.applications
            .borrow()
            .iter()
            .any(|a| a.id == application_id && a.user_id == owner)
    }
}

impl RemoteStore for MemoryStore {
    fn select_applications(&self, owner: &str) -> Result<Vec<Application>> {
        self.select_calls.set(self.select_calls.get() + 1);
        let mut rows: Vec<Application> = self
            .applications
            .borrow()
            .iter()
            .rev()
            .filter(|a| a.user_id == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    fn insert_application(&self, row: &Application) -> Result<()> {
        self.check_write()?;
        self.applications.borrow_mut().push(row.clone());
        Ok(())
    }

    fn update_application(&self, owner: &str, id: &str, patch: &ApplicationPatch) -> Result<()> {
        self.update_calls.set(self.update_calls.get() + 1);
        self.check_write()?;
        let stamp = self.tick();
        let mut rows = self.applications.borrow_mut();
        let row = rows
            .iter_mut()
            .find(|a| a.id == id && a.user_id == owner)
            .ok_or_else(|| TrackerError::NotFound(format!("Application #{}", id)))?;
        patch.apply_to(row);
        row.last_updated = stamp;
        Ok(())
    }

    fn delete_application(&self, owner: &str, id: &str) -> Result<()> {
        self.check_write()?;
        if !self.owns(owner, id) {
            return Err(TrackerError::NotFound(format!("Application #{}", id)));
        }
        self.applications.borrow_mut().retain(|a| a.id != id);
        self.notes.borrow_mut().retain(|n| n.application_id != id);
        Ok(())
    }

    fn select_notes(&self, owner: &str, application_id: &str) -> Result<Vec<Note>> {
        if !self.owns(owner, application_id) {
            return Ok(Vec::new());
        }
        let mut notes: Vec<Note> = self
            .notes
            .borrow()
            .iter()
            .rev()
            .filter(|n| n.application_id == application_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    fn insert_note(&self, owner: &str, note: &Note) -> Result<()> {
        self.check_write()?;
        if !self.owns(owner, &note.application_id) {
            return Err(TrackerError::NotFound(format!("Application #{}", note.application_id)));
        }
        self.notes.borrow_mut().push(note.clone());
        Ok(())
    }

    fn delete_note(&self, owner: &str, note_id: &str) -> Result<()> {
        self.check_write()?;
        let mut notes = self.notes.borrow_mut();
        let before = notes.len();
        let owned: Vec<String> = self
            .applications
            .borrow()
            .iter()
            .filter(|a| a.user_id == owner)
            .map(|a| a.id.clone())
            .collect();
        notes.retain(|n| !(n.id == note_id && owned.contains(&n.application_id)));
        if notes.len() == before {
            return Err(TrackerError::NotFound(format!("Note #{}", note_id)));
        }
        Ok(())
    }
}

/// Auth fake whose user can be swapped or silently expired.
#[derive(Default)]
pub struct StaticAuth {
    user: RefCell<Option<Identity>>,
    listeners: AuthListeners,
}

impl StaticAuth {
    pub fn signed_in(user_id: &str) -> Self {
        let auth = Self::default();
        *auth.user.borrow_mut() = Some(identity(user_id));
        auth
    }

    pub fn sign_in(&self, user_id: &str) {
        let identity = identity(user_id);
        *self.user.borrow_mut() = Some(identity.clone());
        self.listeners.emit(AuthEvent::SignedIn(identity));
    }

    /// Drops the session without notifying anyone, like a token expiring.
    pub fn expire(&self) {
        *self.user.borrow_mut() = None;
    }
}

impl AuthProvider for StaticAuth {
    fn get_user(&self) -> Result<Option<Identity>> {
        Ok(self.user.borrow().clone())
    }

    fn get_session(&self) -> Result<Option<Session>> {
        Ok(self.get_user()?.map(|identity| Session {
            identity,
            created_at: "2030-01-01T00:00:00.000000Z".into(),
        }))
    }

    fn sign_out(&self) -> Result<()> {
        *self.user.borrow_mut() = None;
        self.listeners.emit(AuthEvent::SignedOut);
        Ok(())
    }

    fn on_auth_state_change(&self) -> std::sync::mpsc::Receiver<AuthEvent> {
        self.listeners.subscribe()
    }
}

fn identity(user_id: &str) -> Identity {
    Identity {
        user_id: user_id.to_string(),
        email: format!("{}@example.com", user_id),
    }
}

pub type TestTracker = Tracker<MemoryStore, StaticAuth>;

pub fn tracker() -> TestTracker {
    Tracker::new(MemoryStore::default(), StaticAuth::signed_in(OWNER))
}

/// A tracker over `apps`, all owned by `OWNER`.
pub fn tracker_with(apps: Vec<Application>) -> TestTracker {
    let tracker = tracker();
    for app in apps {
        tracker.store().seed(app);
    }
    tracker
}

pub fn application(id: &str, company: &str, status: ApplicationStatus) -> Application {
    Application {
        id: id.to_string(),
        user_id: OWNER.to_string(),
        company_name: company.to_string(),
        job_title: "Software Engineer".to_string(),
        status,
        job_url: None,
        location: None,
        applied_date: None,
        rejection_reason: None,
        interview_date: None,
        interview_time: None,
        tags: Vec::new(),
        created_at: "2024-01-01T00:00:00.000000Z".to_string(),
        last_updated: "2024-01-01T00:00:00.000000Z".to_string(),
    }
}
