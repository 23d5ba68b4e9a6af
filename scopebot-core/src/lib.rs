// ABOUTME: Scope resolution and command dispatch core for multi-platform chat bots
// ABOUTME: Platform adapters plug in through traits; everything else lives here

pub mod activity;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod message;
pub mod metrics;
pub mod outcome;
pub mod parse;
pub mod paths;
pub mod platform;
pub mod registry;
pub mod reply;
pub mod resolver;
pub mod scope;
pub mod store;
pub mod validate;

pub use activity::{ActivityHandle, ActivitySlots, ActivityState};
pub use command::{admin_only, always, Command, CommandHandler, CommandKind, Permission, ShowUsage};
pub use dispatch::{DispatchOutcome, Dispatcher, Prefixes};
pub use message::Message;
pub use outcome::{Outcome, UserError};
pub use platform::{
    Capability, Classification, EventStream, InboundEvent, MessageHandle, PlaceClassifier,
    PlatformAdapter,
};
pub use registry::{CatalogEntry, Registry};
pub use reply::{RenderTable, Reply, RichReply};
pub use resolver::{Here, ResolveError, ScopeResolver};
pub use scope::{PlaceScopes, Platform, Scope, ScopeKind};
pub use store::{ScopeInfo, ScopeStore, StoreError};
pub use validate::ValidationError;
