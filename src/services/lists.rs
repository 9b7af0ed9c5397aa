use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::errors::{Error, Result};
use crate::gateway::Gateway;
use crate::models::list::{
    CreateList, List, ListDetail, ListMember, ListRole, MembershipWithList, UserList,
};
use crate::session::CurrentUser;
use crate::utils::time::time_now;

const MAX_TITLE_LEN: usize = 100;

pub(crate) fn check_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::InvalidInput(format!(
            "title must be 1 to {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

pub async fn create_list(
    gateway: &dyn Gateway,
    title: &str,
    description: &str,
    owner_id: &str,
) -> Result<List> {
    let title = check_title(title)?;
    let list = gateway
        .create_list_with_owner(CreateList {
            title,
            description: description.trim().to_string(),
            owner_id: owner_id.to_string(),
            created_at: time_now(),
        })
        .await?;

    info!(list_id = %list.id, owner_id, "list created");
    Ok(list)
}

/// One entry per list; `owner` beats any other role for the same list and
/// the first position seen is kept.
pub fn dedup_lists(rows: Vec<MembershipWithList>, user_id: &str) -> Vec<UserList> {
    let mut by_id: IndexMap<String, UserList> = IndexMap::new();

    for row in rows {
        // ? membership whose list row is gone
        let Some(list) = row.list else { continue };
        let is_owner = list.owner_id == user_id;

        match by_id.get_mut(&row.list_id) {
            Some(seen) if row.role == ListRole::Owner && seen.role != ListRole::Owner => {
                seen.role = ListRole::Owner;
                seen.list = list;
                seen.is_owner = is_owner;
            }
            Some(_) => {}
            None => {
                by_id.insert(
                    row.list_id,
                    UserList {
                        list,
                        role: row.role,
                        is_owner,
                    },
                );
            }
        }
    }

    by_id.into_values().collect()
}

pub async fn get_lists(gateway: &dyn Gateway, user_id: &str) -> Result<Vec<UserList>> {
    let rows = gateway.memberships_with_lists(user_id).await?;
    Ok(dedup_lists(rows, user_id))
}

/// Fails with `AccessDenied` unless `user_id` belongs to the list.
pub async fn require_member(gateway: &dyn Gateway, list_id: &str, user_id: &str) -> Result<()> {
    match gateway.find_membership(list_id, user_id).await? {
        Some(_) => Ok(()),
        None => Err(Error::AccessDenied),
    }
}

pub async fn get_list(gateway: &dyn Gateway, list_id: &str, user_id: &str) -> Result<ListDetail> {
    require_member(gateway, list_id, user_id).await?;
    let list = gateway.list_by_id(list_id).await?.ok_or(Error::NotFound)?;
    Ok(ListDetail {
        is_owner: list.owner_id == user_id,
        list,
    })
}

/// Members with their emails, owner first. A failed lookup degrades to
/// whatever is known, and an owner missing from the rows is listed anyway.
pub async fn members_of_list(
    gateway: &dyn Gateway,
    list_id: &str,
    user: &CurrentUser,
) -> Result<Vec<ListMember>> {
    let detail = get_list(gateway, list_id, &user.id).await?;

    let rows = gateway
        .memberships_of_list(list_id)
        .await
        .unwrap_or_else(|error| {
            warn!(%error, list_id, "member lookup failed");
            Vec::new()
        });

    let ids: Vec<String> = rows.iter().map(|m| m.user_id.clone()).collect();
    let emails: HashMap<String, String> = if ids.is_empty() {
        HashMap::new()
    } else {
        match gateway.accounts_by_ids(&ids).await {
            Ok(accounts) => accounts.into_iter().map(|a| (a.id, a.email)).collect(),
            Err(error) => {
                warn!(%error, list_id, "member emails unavailable");
                HashMap::new()
            }
        }
    };

    let mut members: Vec<ListMember> = rows
        .into_iter()
        .map(|m| ListMember {
            email: emails.get(&m.user_id).cloned(),
            user_id: m.user_id,
            role: m.role,
        })
        .collect();

    if detail.is_owner && !members.iter().any(|m| m.user_id == user.id) {
        members.push(ListMember {
            user_id: user.id.clone(),
            role: ListRole::Owner,
            email: Some(user.email.clone()),
        });
    }

    members.sort_by_key(|m| m.role != ListRole::Owner);
    Ok(members)
}

pub async fn delete_list(gateway: &dyn Gateway, list_id: &str, user_id: &str) -> Result<()> {
    let list = gateway.list_by_id(list_id).await?.ok_or(Error::NotFound)?;
    if list.owner_id != user_id {
        return Err(Error::AccessDenied);
    }
    gateway.delete_list_cascade(list_id).await?;
    info!(list_id, "list deleted");
    Ok(())
}
