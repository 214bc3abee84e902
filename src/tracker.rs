//! The context object every surface (CLI, TUI, tests) goes through.
//!
//! Reads flow store -> cache -> projection. Writes go through the mutation
//! engine: status changes optimistically, everything else as plain commits
//! followed by invalidation.

use std::sync::mpsc::Receiver;

use tracing::{debug, info};

use crate::auth::{AuthEvent, AuthProvider, Identity};
use crate::board::{project_board, project_list, BoardFilter, BoardView, ColumnSort};
use crate::cache::{ObserverId, QueryCache, QueryData, QueryKey};
use crate::drag::{DragController, DragEvent, DropDecision};
use crate::error::{Result, TrackerError};
use crate::export::applications_to_csv;
use crate::models::{
    timestamp_now, validate_note_content, Application, ApplicationDraft, ApplicationPatch, Note,
    StatusChange,
};
use crate::mutation;
use crate::store::RemoteStore;

pub struct Tracker<S, A> {
    store: S,
    auth: A,
    cache: QueryCache,
    auth_events: Receiver<AuthEvent>,
}

impl<S: RemoteStore, A: AuthProvider> Tracker<S, A> {
    pub fn new(store: S, auth: A) -> Self {
        let auth_events = auth.on_auth_state_change();
        Self {
            store,
            auth,
            cache: QueryCache::new(),
            auth_events,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    /// Any sign-in or sign-out invalidates everything cached for the old identity.
    fn sync_auth(&mut self) {
        while let Ok(event) = self.auth_events.try_recv() {
            debug!(?event, "auth state changed, clearing cache");
            self.cache.clear();
        }
    }

    pub fn current_user(&mut self) -> Result<Identity> {
        self.sync_auth();
        self.auth.get_user()?.ok_or(TrackerError::Auth)
    }

    pub fn watch(&mut self, key: QueryKey) -> ObserverId {
        self.cache.subscribe(key)
    }

    pub fn unwatch(&mut self, id: ObserverId) {
        self.cache.unsubscribe(id);
    }

    // --- Reads ---

    fn fetch(&mut self, key: &QueryKey) -> Result<()> {
        let user = self.current_user()?;
        let ticket = self.cache.begin_fetch(key.clone());
        let data = match key {
            QueryKey::Applications => {
                QueryData::Applications(self.store.select_applications(&user.user_id)?)
            }
            QueryKey::Notes(application_id) => {
                QueryData::Notes(self.store.select_notes(&user.user_id, application_id)?)
            }
        };
        if self.cache.complete_fetch(ticket, data) {
            debug!(?key, "fetched");
        }
        Ok(())
    }

    fn ensure_fresh(&mut self, key: &QueryKey) -> Result<()> {
        self.sync_auth();
        if self.cache.needs_fetch(key) {
            self.fetch(key)?;
        }
        Ok(())
    }

    /// Cached applications, fetched first when absent or invalidated.
    pub fn applications(&mut self) -> Result<&[Application]> {
        self.ensure_fresh(&QueryKey::Applications)?;
        Ok(self
            .cache
            .get(&QueryKey::Applications)
            .and_then(QueryData::as_applications)
            .unwrap_or(&[]))
    }

    pub fn notes(&mut self, application_id: &str) -> Result<&[Note]> {
        let key = QueryKey::Notes(application_id.to_string());
        self.ensure_fresh(&key)?;
        Ok(self
            .cache
            .get(&key)
            .and_then(QueryData::as_notes)
            .unwrap_or(&[]))
    }

    /// Runs the refetches queued by invalidations of observed keys.
    pub fn refresh(&mut self) -> Result<usize> {
        self.sync_auth();
        let scheduled = self.cache.take_scheduled();
        for key in &scheduled {
            self.fetch(key)?;
        }
        Ok(scheduled.len())
    }

    /// Looks an application up by full id or unique id prefix.
    pub fn resolve_application(&mut self, id_or_prefix: &str) -> Result<Application> {
        let needle = id_or_prefix.trim();
        let applications = self.applications()?;
        if let Some(app) = applications.iter().find(|a| a.id == needle) {
            return Ok(app.clone());
        }
        let matches: Vec<&Application> = applications
            .iter()
            .filter(|a| !needle.is_empty() && a.id.starts_with(needle))
            .collect();
        match matches.as_slice() {
            [app] => Ok((*app).clone()),
            [] => Err(TrackerError::NotFound(format!("Application #{}", needle))),
            _ => Err(TrackerError::Validation(format!(
                "id prefix '{}' matches {} applications",
                needle,
                matches.len()
            ))),
        }
    }

    pub fn board(&mut self, filter: &BoardFilter) -> Result<BoardView> {
        Ok(project_board(self.applications()?, filter))
    }

    pub fn list(&mut self, filter: &BoardFilter, column: Option<ColumnSort>) -> Result<Vec<Application>> {
        Ok(project_list(self.applications()?, filter, column))
    }

    pub fn export_csv(&mut self, filter: &BoardFilter, column: Option<ColumnSort>) -> Result<String> {
        Ok(applications_to_csv(&self.list(filter, column)?))
    }

    // --- Writes ---

    /// Optimistic status change. Signed-out callers fail before the cache is touched.
    pub fn change_status(&mut self, change: StatusChange) -> Result<()> {
        let user = self.current_user()?;
        let patch = ApplicationPatch::from(&change);
        let store = &self.store;

        mutation::mutate(
            &mut self.cache,
            QueryKey::Applications,
            |data| patch_cached(data, &change.id, &patch),
            || store.update_application(&user.user_id, &change.id, &patch),
        )?;
        info!(id = %change.id, status = %change.status, "status changed");
        Ok(())
    }

    pub fn create_application(&mut self, draft: &ApplicationDraft) -> Result<Application> {
        let fields = draft.validate()?;
        let user = self.current_user()?;
        let now = timestamp_now();
        let app = Application {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.user_id,
            company_name: fields.company_name,
            job_title: fields.job_title,
            status: fields.status,
            job_url: fields.job_url,
            location: fields.location,
            applied_date: fields.applied_date,
            rejection_reason: fields.rejection_reason,
            tags: fields.tags,
            interview_date: fields.interview_date,
            interview_time: fields.interview_time,
            created_at: now.clone(),
            last_updated: now,
        };

        let store = &self.store;
        mutation::commit(&mut self.cache, &[QueryKey::Applications], || {
            store.insert_application(&app)
        })?;
        info!(id = %app.id, company = %app.company_name, "created application");
        Ok(app)
    }

    pub fn update_application(&mut self, id: &str, draft: &ApplicationDraft) -> Result<()> {
        let fields = draft.validate()?;
        let user = self.current_user()?;
        let patch = ApplicationPatch::from(&fields);

        let store = &self.store;
        mutation::commit(&mut self.cache, &[QueryKey::Applications], || {
            store.update_application(&user.user_id, id, &patch)
        })?;
        info!(id, "updated application");
        Ok(())
    }

    /// Deletes the application; its notes go with it, in the store and the cache.
    pub fn delete_application(&mut self, id: &str) -> Result<()> {
        let user = self.current_user()?;

        let store = &self.store;
        mutation::commit(&mut self.cache, &[QueryKey::Applications], || {
            store.delete_application(&user.user_id, id)
        })?;
        self.cache.remove(&QueryKey::Notes(id.to_string()));
        info!(id, "deleted application");
        Ok(())
    }

    pub fn add_note(&mut self, application_id: &str, content: &str) -> Result<Note> {
        let content = validate_note_content(content)?;
        let user = self.current_user()?;
        let note = Note {
            id: uuid::Uuid::new_v4().to_string(),
            application_id: application_id.to_string(),
            content,
            created_at: timestamp_now(),
        };

        let store = &self.store;
        mutation::commit(
            &mut self.cache,
            &[QueryKey::Notes(application_id.to_string())],
            || store.insert_note(&user.user_id, &note),
        )?;
        Ok(note)
    }

    pub fn delete_note(&mut self, application_id: &str, note_id: &str) -> Result<()> {
        let user = self.current_user()?;

        let store = &self.store;
        mutation::commit(
            &mut self.cache,
            &[QueryKey::Notes(application_id.to_string())],
            || store.delete_note(&user.user_id, note_id),
        )
    }

    // --- Drag glue ---

    /// Feeds one drag event through the controller and fires the status
    /// mutation when the drop calls for it.
    pub fn handle_drag(&mut self, dnd: &mut DragController, event: DragEvent) -> Result<DropDecision> {
        let decision = dnd.handle(event);
        if let DropDecision::Mutate(change) = &decision {
            self.change_status(change.clone())?;
        }
        Ok(decision)
    }

    pub fn confirm_rejection(
        &mut self,
        dnd: &mut DragController,
        category: &str,
        detail: &str,
    ) -> Result<()> {
        let change = dnd.confirm_rejection(category, detail)?;
        self.change_status(change)
    }
}

fn patch_cached(data: &QueryData, id: &str, patch: &ApplicationPatch) -> QueryData {
    match data {
        QueryData::Applications(apps) => QueryData::Applications(
            apps.iter()
                .map(|app| {
                    let mut app = app.clone();
                    if app.id == id {
                        patch.apply_to(&mut app);
                    }
                    app
                })
                .collect(),
        ),
        other => other.clone(),
    }
}
