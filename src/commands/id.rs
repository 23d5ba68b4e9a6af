// ABOUTME: Advanced `id place|person` commands exposing resolved scope identities
// ABOUTME: Shows exact and logical scopes with the store's reverse lookup

use anyhow::Result;
use async_trait::async_trait;
use scopebot_core::{
    Capability, Command, CommandHandler, CommandKind, Message, Outcome, RenderTable, Reply,
    RichReply, Scope, ScopeInfo,
};
use std::sync::Arc;

const CATEGORY: &str = "info";

struct PlaceView {
    query: String,
    exact: ScopeInfo,
    logical: ScopeInfo,
}

fn describe(info: &ScopeInfo) -> String {
    if info.is_sentinel {
        format!("{} ({} placeholder)", info.scope, info.kind)
    } else {
        format!("{} ({} {})", info.scope, info.kind, info.native_id)
    }
}

fn place_plain(view: &PlaceView) -> Reply {
    Reply::text(format!(
        "{}: exact {}, logical {}",
        view.query,
        describe(&view.exact),
        describe(&view.logical)
    ))
}

fn place_rich(view: &PlaceView) -> Reply {
    let mut rich = RichReply::new()
        .title(format!("Scopes of {}", view.query))
        .field("Exact", describe(&view.exact), true)
        .field("Logical", describe(&view.logical), true);
    if let Some(parent) = view.exact.parent {
        rich = rich.field("Parent", parent.to_string(), true);
    }
    Reply::rich(rich.footer(view.exact.platform.to_string()))
}

struct PersonView {
    query: String,
    scope: Scope,
}

fn person_plain(view: &PersonView) -> Reply {
    Reply::text(format!("{}: person {}", view.query, view.scope))
}

fn person_rich(view: &PersonView) -> Reply {
    Reply::rich(
        RichReply::new()
            .title(format!("Scope of {}", view.query))
            .field("Person", view.scope.to_string(), true),
    )
}

async fn scope_info(msg: &Message, scope: Scope) -> Result<ScopeInfo> {
    let store = Arc::clone(msg.resolver().store());
    Ok(tokio::task::spawn_blocking(move || store.scope_info(scope)).await??)
}

struct PlaceId {
    views: RenderTable<PlaceView>,
}

#[async_trait]
impl CommandHandler for PlaceId {
    async fn run(&self, msg: &Message) -> Result<Outcome> {
        let target = msg.arg(0);
        let exact = match msg.exact_scope(target).await {
            Ok(scope) => scope,
            Err(e) => return e.into_outcome(),
        };
        let logical = match msg.logical_scope(target).await {
            Ok(scope) => scope,
            Err(e) => return e.into_outcome(),
        };

        let view = PlaceView {
            query: target.unwrap_or("here").to_string(),
            exact: scope_info(msg, exact).await?,
            logical: scope_info(msg, logical).await?,
        };
        Ok(Outcome::Reply(msg.render(&self.views, &view)))
    }
}

struct PersonId {
    views: RenderTable<PersonView>,
}

#[async_trait]
impl CommandHandler for PersonId {
    async fn run(&self, msg: &Message) -> Result<Outcome> {
        let target = msg.arg(0);
        let scope = match msg.person_scope(target).await {
            Ok(scope) => scope,
            Err(e) => return e.into_outcome(),
        };
        let view = PersonView {
            query: target.unwrap_or_else(|| msg.author_name()).to_string(),
            scope,
        };
        Ok(Outcome::Reply(msg.render(&self.views, &view)))
    }
}

pub fn commands() -> Vec<Command> {
    let place = Arc::new(PlaceId {
        views: RenderTable::new(place_plain).with(Capability::RichText, place_rich),
    });
    let person = Arc::new(PersonId {
        views: RenderTable::new(person_plain).with(Capability::RichText, person_rich),
    });

    vec![Command::group("id", CommandKind::Advanced, CATEGORY)
        .names(&["id"])
        .description("Show scope identities")
        .child(
            Command::new("id.place", CommandKind::Advanced, CATEGORY, place)
                .names(&["place", "where"])
                .description("Exact and logical scope of a channel or server")
                .usage("[id]")
                .parent("id"),
        )
        .child(
            Command::new("id.person", CommandKind::Advanced, CATEGORY, person)
                .names(&["person", "who"])
                .description("Person scope of a user")
                .usage("[user]")
                .parent("id"),
        )]
}
