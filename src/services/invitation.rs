//! Invitation lifecycle: `pending` -> `accepted` | `rejected`, nothing after.
//!
//! Acceptance runs as separate steps (status, membership lookup, membership
//! insert, notification read) because nothing here can span the platform's
//! tables in one transaction. Every step is safe to repeat.
//!
//! Answering by id is reserved to the invitee, matched on email. Answering by
//! token trusts whoever holds the link.

use tracing::{info, warn};
use validator::ValidateEmail;

use crate::consts::invite_const::{ACCEPT_INVITE_PATH, INVITATION_TTL_DAYS};
use crate::errors::{Error, Result};
use crate::gateway::{Gateway, GatewayError};
use crate::models::{
    invitation::{
        AcceptOutcome, CreateInvitation, CreatedInvitation, Invitation, InvitationRef,
        InvitationStatus, RejectOutcome, ResolvedInvitation,
    },
    list::{CreateListMembership, ListRole},
    notification::{CreateNotification, InvitationRefs},
};
use crate::session::CurrentUser;
use crate::utils::{
    time::{time_now, time_now_plus_days},
    token::{generate_invitation_token, hash_token},
};

pub async fn create_invitation(
    gateway: &dyn Gateway,
    app_origin: &str,
    list_id: &str,
    email: &str,
    invited_by: &str,
) -> Result<CreatedInvitation> {
    let email = email.trim().to_lowercase();
    if !email.validate_email() {
        return Err(Error::InvalidInput(format!("`{email}` is not a valid email")));
    }

    if gateway.find_membership(list_id, invited_by).await?.is_none() {
        return Err(Error::AccessDenied);
    }

    let (token, token_hash) = generate_invitation_token();
    let invitation = gateway
        .create_invitation(CreateInvitation {
            list_id: list_id.to_string(),
            invited_by: invited_by.to_string(),
            email: email.clone(),
            token_hash,
            status: InvitationStatus::Pending,
            created_at: time_now(),
            expires_at: time_now_plus_days(INVITATION_TTL_DAYS),
        })
        .await?;

    notify_invitee(gateway, &invitation).await;

    info!(invitation_id = %invitation.id, list_id, "invitation created");
    Ok(CreatedInvitation {
        invite_link: format!("{app_origin}{ACCEPT_INVITE_PATH}?token={token}"),
        invitation,
    })
}

/// Notifies the invitee if the email already belongs to an account. The
/// invitation stands regardless of what happens here.
async fn notify_invitee(gateway: &dyn Gateway, invitation: &Invitation) {
    let account = match gateway.account_by_email(&invitation.email).await {
        Ok(Some(account)) => account,
        Ok(None) => return,
        Err(error) => {
            warn!(%error, invitation_id = %invitation.id, "invitee lookup failed, no notification");
            return;
        }
    };

    let refs = InvitationRefs {
        invitation_id: Some(invitation.id.clone()),
        list_id: Some(invitation.list_id.clone()),
        invited_by: Some(invitation.invited_by.clone()),
    };
    if let Err(error) = gateway
        .create_notification(CreateNotification::list_invitation(account.id, refs, time_now()))
        .await
    {
        warn!(%error, invitation_id = %invitation.id, "invitation notification not created");
    }
}

/// Anonymous view of a pending invitation.
pub async fn resolve_invitation_by_token(
    gateway: &dyn Gateway,
    token: &str,
) -> Result<ResolvedInvitation> {
    let invitation = gateway
        .invitation_by_token_hash(&hash_token(token))
        .await?
        .filter(|i| i.status == InvitationStatus::Pending && !i.is_expired(time_now()))
        .ok_or(Error::InvitationInvalidOrExpired)?;

    let list = gateway
        .list_by_id(&invitation.list_id)
        .await?
        .ok_or(Error::InvitationInvalidOrExpired)?;

    Ok(ResolvedInvitation { invitation, list })
}

async fn load(gateway: &dyn Gateway, by: &InvitationRef) -> Result<Invitation> {
    let found = match by {
        InvitationRef::Id(id) => gateway.invitation_by_id(id).await?,
        InvitationRef::Token(token) => gateway.invitation_by_token_hash(&hash_token(token)).await?,
    };
    found.ok_or(Error::InvitationInvalidOrExpired)
}

fn ensure_invitee(invitation: &Invitation, user: &CurrentUser) -> Result<()> {
    if invitation.email.eq_ignore_ascii_case(&user.email) {
        Ok(())
    } else {
        warn!(invitation_id = %invitation.id, user_id = %user.id, "invitation answered by someone else");
        Err(Error::AccessDenied)
    }
}

pub async fn accept_invitation(
    gateway: &dyn Gateway,
    by: InvitationRef,
    user: &CurrentUser,
) -> Result<AcceptOutcome> {
    let invitation = load(gateway, &by).await?;
    if matches!(by, InvitationRef::Id(_)) {
        ensure_invitee(&invitation, user)?;
    }
    let user_id = user.id.as_str();

    match invitation.status {
        InvitationStatus::Accepted => {
            return Ok(AcceptOutcome {
                success: true,
                list_id: invitation.list_id,
                already_accepted: true,
                already_member: false,
            });
        }
        InvitationStatus::Rejected => return Err(Error::InvitationClosed),
        InvitationStatus::Pending if invitation.is_expired(time_now()) => {
            return Err(Error::InvitationInvalidOrExpired);
        }
        InvitationStatus::Pending => {}
    }

    gateway
        .set_invitation_status(&invitation.id, InvitationStatus::Accepted)
        .await
        .map_err(Error::InvitationUpdate)?;

    let existing = gateway
        .find_membership(&invitation.list_id, user_id)
        .await
        .map_err(Error::MembershipCheck)?;

    let already_member = match existing {
        Some(_) => true,
        None => match gateway
            .insert_membership(CreateListMembership {
                list_id: invitation.list_id.clone(),
                user_id: user_id.to_string(),
                role: ListRole::Member,
                created_at: time_now(),
            })
            .await
        {
            Ok(_) => false,
            // ? lost a race with another accept path, the row is there
            Err(GatewayError::Conflict(_)) => true,
            Err(error) => return Err(Error::MembershipInsert(error)),
        },
    };

    mark_related_notifications_read(gateway, user_id, &invitation.id).await;

    info!(
        invitation_id = %invitation.id,
        list_id = %invitation.list_id,
        user_id,
        already_member,
        "invitation accepted"
    );
    Ok(AcceptOutcome {
        success: true,
        list_id: invitation.list_id,
        already_accepted: false,
        already_member,
    })
}

pub async fn reject_invitation(
    gateway: &dyn Gateway,
    invitation_id: &str,
    user: &CurrentUser,
) -> Result<RejectOutcome> {
    let invitation = load(gateway, &InvitationRef::Id(invitation_id.to_string())).await?;
    ensure_invitee(&invitation, user)?;
    let user_id = user.id.as_str();

    match invitation.status {
        InvitationStatus::Accepted => return Err(Error::InvitationClosed),
        InvitationStatus::Rejected => {}
        InvitationStatus::Pending => {
            gateway
                .set_invitation_status(&invitation.id, InvitationStatus::Rejected)
                .await
                .map_err(Error::InvitationUpdate)?;
            info!(invitation_id, user_id, "invitation rejected");
        }
    }

    mark_related_notifications_read(gateway, user_id, invitation_id).await;
    Ok(RejectOutcome { success: true })
}

async fn mark_related_notifications_read(gateway: &dyn Gateway, user_id: &str, invitation_id: &str) {
    let ids: Vec<String> = match gateway
        .notifications_for_invitation(user_id, invitation_id)
        .await
    {
        Ok(found) => found.into_iter().map(|n| n.id).collect(),
        Err(error) => {
            warn!(%error, invitation_id, "could not look up invitation notifications");
            return;
        }
    };
    if ids.is_empty() {
        return;
    }
    if let Err(error) = gateway.mark_notifications_read(&ids).await {
        warn!(%error, invitation_id, "could not mark invitation notifications read");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::gateway::memory::MemoryGateway;
    use crate::models::list::CreateList;
    use crate::models::user::CreateAccount;

    const ORIGIN: &str = "https://lists.example";

    async fn seed(gw: &MemoryGateway) -> (String, String) {
        let alice = gw
            .create_account(CreateAccount {
                email: "alice@example.com".into(),
                password_hash: String::new(),
                created_at: time_now(),
            })
            .await
            .unwrap();
        let list = gw
            .create_list_with_owner(CreateList {
                title: "L1".into(),
                description: String::new(),
                owner_id: alice.id.clone(),
                created_at: time_now(),
            })
            .await
            .unwrap();
        (alice.id, list.id)
    }

    fn caller(id: &str, email: &str) -> CurrentUser {
        CurrentUser {
            id: id.into(),
            email: email.into(),
            session_id: "s1".into(),
        }
    }

    async fn bob(gw: &MemoryGateway) -> CurrentUser {
        let account = gw
            .create_account(CreateAccount {
                email: "bob@example.com".into(),
                password_hash: String::new(),
                created_at: time_now(),
            })
            .await
            .unwrap();
        caller(&account.id, &account.email)
    }

    fn token_of(created: &CreatedInvitation) -> String {
        created
            .invite_link
            .split("token=")
            .nth(1)
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_create_builds_link_and_notifies_registered_invitee() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let bob = bob(&gw).await;

        let created = create_invitation(&gw, ORIGIN, &list, "Bob@Example.com", &alice)
            .await
            .unwrap();

        assert!(created
            .invite_link
            .starts_with("https://lists.example/accept-invite?token="));
        let token = token_of(&created);
        assert_eq!(created.invitation.token_hash, hash_token(&token));
        assert_eq!(created.invitation.email, "bob@example.com");
        assert_eq!(
            created.invitation.expires_at - created.invitation.created_at,
            Duration::days(7)
        );

        let notes = gw.notifications_for_user(&bob.id).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].references_invitation(&created.invitation.id));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_creation() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        bob(&gw).await;
        gw.fail_on("create_notification").await;

        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice).await;
        assert!(created.is_ok());

        gw.recover("create_notification").await;
        gw.fail_on("account_by_email").await;
        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice).await;
        assert!(created.is_ok());
        assert_eq!(gw.invitation_count().await, 2);
    }

    #[tokio::test]
    async fn test_invalid_email_never_reaches_the_platform() {
        let gw = MemoryGateway::new();
        let err = create_invitation(&gw, ORIGIN, "l1", "not-an-email", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(gw.calls("find_membership").await, 0);
    }

    #[tokio::test]
    async fn test_only_members_can_invite() {
        let gw = MemoryGateway::new();
        let (_, list) = seed(&gw).await;
        let err = create_invitation(&gw, ORIGIN, &list, "bob@example.com", "stranger")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied));
    }

    #[tokio::test]
    async fn test_accept_twice_is_idempotent() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let bob = bob(&gw).await;
        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice)
            .await
            .unwrap();
        let id = InvitationRef::Id(created.invitation.id.clone());

        let first = accept_invitation(&gw, id.clone(), &bob).await.unwrap();
        assert!(first.success);
        assert!(!first.already_accepted);
        assert_eq!(first.list_id, list);

        let second = accept_invitation(&gw, id, &bob).await.unwrap();
        assert!(second.success);
        assert!(second.already_accepted);
        assert_eq!(gw.membership_count(&list, &bob.id).await, 1);
    }

    #[tokio::test]
    async fn test_accept_when_already_member() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let bob = bob(&gw).await;
        gw.insert_membership(CreateListMembership {
            list_id: list.clone(),
            user_id: bob.id.clone(),
            role: ListRole::Member,
            created_at: time_now(),
        })
        .await
        .unwrap();
        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice)
            .await
            .unwrap();

        let outcome = accept_invitation(&gw, InvitationRef::Token(token_of(&created)), &bob)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.already_member);
        assert_eq!(gw.membership_count(&list, &bob.id).await, 1);
    }

    #[tokio::test]
    async fn test_accept_marks_notification_read() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let bob = bob(&gw).await;
        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice)
            .await
            .unwrap();

        accept_invitation(&gw, InvitationRef::Id(created.invitation.id), &bob)
            .await
            .unwrap();
        let notes = gw.notifications_for_user(&bob.id).await.unwrap();
        assert!(notes.iter().all(|n| n.read));
    }

    #[tokio::test]
    async fn test_accept_failures_are_distinct() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let bob = bob(&gw).await;
        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice)
            .await
            .unwrap();
        let id = InvitationRef::Id(created.invitation.id.clone());

        gw.fail_on("set_invitation_status").await;
        let err = accept_invitation(&gw, id.clone(), &bob).await.unwrap_err();
        assert!(matches!(err, Error::InvitationUpdate(_)));
        gw.recover("set_invitation_status").await;

        gw.fail_on("insert_membership").await;
        let err = accept_invitation(&gw, id.clone(), &bob).await.unwrap_err();
        assert!(matches!(err, Error::MembershipInsert(_)));
    }

    #[tokio::test]
    async fn test_expired_or_unknown_tokens() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let bob = bob(&gw).await;
        let expired = gw
            .create_invitation(CreateInvitation {
                list_id: list.clone(),
                invited_by: alice,
                email: "bob@example.com".into(),
                token_hash: hash_token("old"),
                status: InvitationStatus::Pending,
                created_at: time_now() - Duration::days(8),
                expires_at: time_now() - Duration::days(1),
            })
            .await
            .unwrap();

        assert!(matches!(
            resolve_invitation_by_token(&gw, "old").await,
            Err(Error::InvitationInvalidOrExpired)
        ));
        assert!(matches!(
            resolve_invitation_by_token(&gw, "nope").await,
            Err(Error::InvitationInvalidOrExpired)
        ));
        assert!(matches!(
            accept_invitation(&gw, InvitationRef::Id(expired.id), &bob).await,
            Err(Error::InvitationInvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_resolve_returns_list_without_a_session() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice)
            .await
            .unwrap();

        let resolved = resolve_invitation_by_token(&gw, &token_of(&created))
            .await
            .unwrap();
        assert_eq!(resolved.list.id, list);
        assert_eq!(resolved.invitation.status, InvitationStatus::Pending);
    }

    #[tokio::test]
    async fn test_reject_then_accept_is_refused() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let bob = bob(&gw).await;
        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice)
            .await
            .unwrap();

        gw.fail_on("mark_notifications_read").await;
        let rejected = reject_invitation(&gw, &created.invitation.id, &bob)
            .await
            .unwrap();
        assert!(rejected.success);

        // second reject is a no-op success
        assert!(reject_invitation(&gw, &created.invitation.id, &bob).await.is_ok());

        assert!(matches!(
            accept_invitation(&gw, InvitationRef::Id(created.invitation.id), &bob).await,
            Err(Error::InvitationClosed)
        ));
        assert_eq!(gw.membership_count(&list, &bob.id).await, 0);
    }

    #[tokio::test]
    async fn test_only_the_invitee_answers_by_id() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let bob = bob(&gw).await;
        let mallory = caller("mallory", "mallory@example.com");
        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice)
            .await
            .unwrap();
        let id = created.invitation.id.clone();

        assert!(matches!(
            reject_invitation(&gw, &id, &mallory).await,
            Err(Error::AccessDenied)
        ));
        assert!(matches!(
            accept_invitation(&gw, InvitationRef::Id(id.clone()), &mallory).await,
            Err(Error::AccessDenied)
        ));
        assert_eq!(gw.calls("set_invitation_status").await, 0);

        let outcome = accept_invitation(&gw, InvitationRef::Id(id), &bob).await.unwrap();
        assert!(outcome.success);
        assert_eq!(gw.membership_count(&list, "mallory").await, 0);
    }

    #[tokio::test]
    async fn test_token_holder_may_accept() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice)
            .await
            .unwrap();
        let carol = caller("carol", "carol@example.com");

        let outcome = accept_invitation(&gw, InvitationRef::Token(token_of(&created)), &carol)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(gw.membership_count(&list, "carol").await, 1);
    }

    #[tokio::test]
    async fn test_reject_after_accept_is_refused() {
        let gw = MemoryGateway::new();
        let (alice, list) = seed(&gw).await;
        let bob = bob(&gw).await;
        let created = create_invitation(&gw, ORIGIN, &list, "bob@example.com", &alice)
            .await
            .unwrap();
        let id = created.invitation.id.clone();

        accept_invitation(&gw, InvitationRef::Id(id.clone()), &bob).await.unwrap();
        assert!(matches!(
            reject_invitation(&gw, &id, &bob).await,
            Err(Error::InvitationClosed)
        ));
        let stored = gw.invitation_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvitationStatus::Accepted);
    }
}
