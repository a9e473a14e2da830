//! Which senders the bot leaves alone.
//!
//! Owners, guild owners and anything on the immunity list (user, role,
//! channel or guild ids) are exempt from automatic replies. Explicit commands
//! still work for them.

use crate::chat::ConversationTurn;
use std::collections::HashSet;

pub trait ModerationPolicy: Send + Sync {
    fn is_exempt(&self, turn: &ConversationTurn) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct ImmunityList {
    owners: HashSet<u64>,
    immune: HashSet<u64>,
}

impl ImmunityList {
    pub fn new(owners: impl IntoIterator<Item = u64>, immune: impl IntoIterator<Item = u64>) -> Self {
        ImmunityList {
            owners: owners.into_iter().collect(),
            immune: immune.into_iter().collect(),
        }
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owners.contains(&user_id)
    }
}

impl ModerationPolicy for ImmunityList {
    fn is_exempt(&self, turn: &ConversationTurn) -> bool {
        let sender = &turn.sender;

        self.owners.contains(&sender.id.0)
            || sender.is_guild_owner
            || self.immune.contains(&sender.id.0)
            || self.immune.contains(&turn.channel_id.0)
            || turn.guild_id.map(|g| self.immune.contains(&g.0)).unwrap_or(false)
            || sender.role_ids.iter().any(|role| self.immune.contains(role))
    }
}
