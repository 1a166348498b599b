use std::future::Future;
use std::sync::Arc;

use teloxide::Bot;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, ChatMemberStatus, UserId};

use super::ledger::JoinRequestLedger;

/// Channel id meaning "requirement disabled, always satisfied". Lets admins
/// park a requirement without deleting its row.
pub const EXEMPT_CHANNEL_ID: i64 = 0;

/// How a channel expects users to get in: open subscription, or a join
/// request that an admin approves later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Subscribe,
    JoinRequest,
}

/// Anything that names a channel a user must be associated with before the
/// bot lets them proceed. Database rows implement this so handlers can feed
/// them to the gate directly.
pub trait Requirement {
    fn channel_id(&self) -> i64;
    fn mode(&self) -> ChannelMode;
}

#[derive(Debug, Clone)]
pub struct ChannelRequirement {
    pub channel_id: i64,
    pub mode: ChannelMode,
}

impl Requirement for ChannelRequirement {
    fn channel_id(&self) -> i64 {
        self.channel_id
    }

    fn mode(&self) -> ChannelMode {
        self.mode
    }
}

/// External chat-membership lookup. A trait seam so tests can stub the
/// network call; the real implementation wraps the Telegram API.
pub trait MembershipApi: Send + Sync {
    fn member_status(
        &self,
        channel_id: i64,
        user_id: u64,
    ) -> impl Future<Output = anyhow::Result<ChatMemberStatus>> + Send;
}

#[derive(Clone)]
pub struct TelegramMembership {
    bot: Bot,
}

impl TelegramMembership {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl MembershipApi for TelegramMembership {
    async fn member_status(&self, channel_id: i64, user_id: u64) -> anyhow::Result<ChatMemberStatus> {
        let member = self
            .bot
            .get_chat_member(ChatId(channel_id), UserId(user_id))
            .await?;
        Ok(member.status())
    }
}

/// Decides whether a user satisfies a channel requirement: subscribe-mode
/// channels are checked against the Telegram API, join-request channels
/// against the [`JoinRequestLedger`]. Stateless apart from those two
/// collaborators; answers are plain booleans, never errors.
pub struct SubscriptionGate<A> {
    ledger: Arc<JoinRequestLedger>,
    membership: A,
}

impl<A: MembershipApi> SubscriptionGate<A> {
    pub fn new(ledger: Arc<JoinRequestLedger>, membership: A) -> Self {
        Self { ledger, membership }
    }

    pub fn ledger(&self) -> &Arc<JoinRequestLedger> {
        &self.ledger
    }

    /// True iff the user satisfies the requirement. A membership lookup that
    /// fails counts as not subscribed: the user is asked to retry rather
    /// than waved through.
    pub async fn check<R: Requirement>(&self, user_id: u64, requirement: &R) -> bool {
        let channel_id = requirement.channel_id();
        if channel_id == EXEMPT_CHANNEL_ID {
            return true;
        }
        match requirement.mode() {
            ChannelMode::JoinRequest => self.ledger.is_pending(channel_id, user_id).await,
            ChannelMode::Subscribe => {
                match self.membership.member_status(channel_id, user_id).await {
                    Ok(status) => is_present_status(status),
                    Err(e) => {
                        log::error!("membership check failed for channel {}: {}", channel_id, e);
                        false
                    }
                }
            }
        }
    }

    /// The requirements the user does not satisfy yet, in input order. An
    /// empty result means the gate is fully satisfied.
    pub async fn filter_unsatisfied<'a, R: Requirement>(
        &self,
        user_id: u64,
        requirements: &'a [R],
    ) -> Vec<&'a R> {
        let mut unsatisfied = Vec::new();
        for requirement in requirements {
            if !self.check(user_id, requirement).await {
                unsatisfied.push(requirement);
            }
        }
        unsatisfied
    }
}

fn is_present_status(status: ChatMemberStatus) -> bool {
    matches!(
        status,
        ChatMemberStatus::Owner
            | ChatMemberStatus::Administrator
            | ChatMemberStatus::Member
            | ChatMemberStatus::Restricted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Duration, advance};

    /// Stub membership capability: per-channel canned statuses, anything
    /// else fails like an unreachable chat.
    struct FakeMembership {
        statuses: HashMap<i64, ChatMemberStatus>,
        calls: AtomicUsize,
    }

    impl FakeMembership {
        fn new(statuses: &[(i64, ChatMemberStatus)]) -> Self {
            Self {
                statuses: statuses.iter().cloned().collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MembershipApi for FakeMembership {
        async fn member_status(
            &self,
            channel_id: i64,
            _user_id: u64,
        ) -> anyhow::Result<ChatMemberStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.statuses
                .get(&channel_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("chat not found"))
        }
    }

    fn gate(statuses: &[(i64, ChatMemberStatus)]) -> SubscriptionGate<FakeMembership> {
        SubscriptionGate::new(
            Arc::new(JoinRequestLedger::new()),
            FakeMembership::new(statuses),
        )
    }

    fn subscribe(channel_id: i64) -> ChannelRequirement {
        ChannelRequirement {
            channel_id,
            mode: ChannelMode::Subscribe,
        }
    }

    fn join_request(channel_id: i64) -> ChannelRequirement {
        ChannelRequirement {
            channel_id,
            mode: ChannelMode::JoinRequest,
        }
    }

    #[tokio::test]
    async fn exempt_channel_is_always_satisfied() {
        let gate = gate(&[]);
        assert!(gate.check(7, &subscribe(EXEMPT_CHANNEL_ID)).await);
        assert!(gate.check(7, &join_request(EXEMPT_CHANNEL_ID)).await);
        // The sentinel short-circuits before any network call.
        assert_eq!(gate.membership.calls(), 0);
    }

    #[tokio::test]
    async fn subscribe_mode_accepts_present_statuses_only() {
        let cases = [
            (ChatMemberStatus::Member, true),
            (ChatMemberStatus::Administrator, true),
            (ChatMemberStatus::Owner, true),
            (ChatMemberStatus::Restricted, true),
            (ChatMemberStatus::Left, false),
            (ChatMemberStatus::Banned, false),
        ];
        for (status, expected) in cases {
            let gate = gate(&[(-100, status.clone())]);
            assert_eq!(
                gate.check(7, &subscribe(-100)).await,
                expected,
                "status {:?}",
                status
            );
        }
    }

    #[tokio::test]
    async fn subscribe_mode_fails_closed_on_lookup_error() {
        let gate = gate(&[]);
        assert!(!gate.check(7, &subscribe(-100)).await);
        assert_eq!(gate.membership.calls(), 1);
    }

    #[tokio::test]
    async fn join_request_mode_consults_the_ledger_not_the_api() {
        let gate = gate(&[]);
        assert!(!gate.check(7, &join_request(-100)).await);
        gate.ledger().record(-100, 7).await;
        assert!(gate.check(7, &join_request(-100)).await);
        assert_eq!(gate.membership.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn join_request_mode_respects_expiry() {
        let gate = gate(&[]);
        gate.ledger().record(-100, 7).await;
        advance(Duration::from_secs(301)).await;
        assert!(!gate.check(7, &join_request(-100)).await);
    }

    #[tokio::test]
    async fn filter_unsatisfied_keeps_input_order() {
        let gate = gate(&[
            (-1, ChatMemberStatus::Member),
            (-2, ChatMemberStatus::Left),
            (-4, ChatMemberStatus::Left),
        ]);
        gate.ledger().record(-3, 7).await;

        let requirements = vec![
            subscribe(-1),      // satisfied
            subscribe(-2),      // not a member
            join_request(-3),   // pending request
            subscribe(-4),      // not a member
            subscribe(-5),      // lookup fails, counts as unsatisfied
        ];
        let unsatisfied = gate.filter_unsatisfied(7, &requirements).await;
        let ids: Vec<i64> = unsatisfied.iter().map(|r| r.channel_id()).collect();
        assert_eq!(ids, vec![-2, -4, -5]);
    }

    #[tokio::test]
    async fn filter_unsatisfied_empty_and_all_satisfied() {
        let gate = gate(&[(-1, ChatMemberStatus::Member)]);
        let none: Vec<ChannelRequirement> = Vec::new();
        assert!(gate.filter_unsatisfied(7, &none).await.is_empty());

        let all_good = vec![subscribe(-1), subscribe(EXEMPT_CHANNEL_ID)];
        assert!(gate.filter_unsatisfied(7, &all_good).await.is_empty());
    }
}
