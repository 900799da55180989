//! Discord side of the relay: trigger matching, context collection and
//! result delivery, with the client itself owned by [`ChatSupervisor`].

pub mod collect;
pub mod connection;
pub mod conversation;
pub mod delivery;
pub mod events;
pub mod supervisor;
#[cfg(test)]
pub mod testing;
pub mod tools;
pub mod triggers;

use std::sync::Arc;

pub use supervisor::{BotStatus, ChatSupervisor};

use crate::core::dispatcher::ActionDispatcher;
use crate::core::store::Store;
use events::{ChatEventKind, HandlerTable};
use triggers::{ChatPipeline, MessageTrigger, ReactionTrigger};

/// The production handler table: reactions and text/mention triggers.
pub fn default_handlers(store: Store, dispatcher: ActionDispatcher) -> HandlerTable {
    let pipeline = ChatPipeline::new(store, dispatcher);
    let mut table = HandlerTable::new();
    table.register(
        ChatEventKind::ReactionAdd,
        Arc::new(ReactionTrigger::new(pipeline.clone())),
    );
    table.register(
        ChatEventKind::Message,
        Arc::new(MessageTrigger::new(pipeline)),
    );
    table
}
