use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::info;

use crate::db::Database;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut,
}

/// Identity provider the tracker consults before every owner-scoped call.
pub trait AuthProvider {
    fn get_user(&self) -> Result<Option<Identity>>;
    fn get_session(&self) -> Result<Option<Session>>;
    fn sign_out(&self) -> Result<()>;
    /// Sign-in/sign-out transitions are queued on the returned receiver.
    /// Dropping the receiver unsubscribes.
    fn on_auth_state_change(&self) -> Receiver<AuthEvent>;
}

/// Fan-out for auth transitions. Senders whose receiver is gone are pruned.
#[derive(Default)]
pub struct AuthListeners {
    senders: RefCell<Vec<Sender<AuthEvent>>>,
}

impl AuthListeners {
    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        let (tx, rx) = mpsc::channel();
        self.senders.borrow_mut().push(tx);
        rx
    }

    pub fn emit(&self, event: AuthEvent) {
        self.senders
            .borrow_mut()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Session kept as a row in the local store, one active session at a time.
pub struct LocalAuth {
    db: Rc<Database>,
    listeners: AuthListeners,
}

impl LocalAuth {
    pub fn new(db: Rc<Database>) -> Self {
        Self {
            db,
            listeners: AuthListeners::default(),
        }
    }

    pub fn sign_in(&self, email: &str, full_name: Option<&str>) -> Result<Identity> {
        let profile = self.db.upsert_profile(email, full_name)?;
        self.db.replace_session(&profile.id)?;
        let identity = Identity {
            user_id: profile.id,
            email: profile.email,
        };
        info!(user = %identity.email, "signed in");
        self.listeners.emit(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }
}

impl AuthProvider for LocalAuth {
    fn get_user(&self) -> Result<Option<Identity>> {
        Ok(self.get_session()?.map(|session| session.identity))
    }

    fn get_session(&self) -> Result<Option<Session>> {
        self.db.current_session()
    }

    fn sign_out(&self) -> Result<()> {
        self.db.clear_sessions()?;
        info!("signed out");
        self.listeners.emit(AuthEvent::SignedOut);
        Ok(())
    }

    fn on_auth_state_change(&self) -> Receiver<AuthEvent> {
        self.listeners.subscribe()
    }
}
