use tracing::info;

use crate::errors::{Error, Result};
use crate::gateway::Gateway;
use crate::models::task::{CreateTask, Task, TaskPatch};
use crate::services::lists::{check_title, require_member};
use crate::utils::time::time_now;

/// Loads the task and checks that `user_id` may touch it.
async fn task_for_member(gateway: &dyn Gateway, task_id: &str, user_id: &str) -> Result<Task> {
    let task = gateway.task_by_id(task_id).await?.ok_or(Error::NotFound)?;
    require_member(gateway, &task.list_id, user_id).await?;
    Ok(task)
}

pub async fn create_task(
    gateway: &dyn Gateway,
    list_id: &str,
    title: &str,
    description: &str,
    user_id: &str,
) -> Result<Task> {
    let title = check_title(title)?;
    require_member(gateway, list_id, user_id).await?;

    let task = gateway
        .create_task(CreateTask {
            list_id: list_id.to_string(),
            title,
            description: description.trim().to_string(),
            completed: false,
            created_by: user_id.to_string(),
            created_at: time_now(),
        })
        .await?;
    info!(task_id = %task.id, list_id, "task created");
    Ok(task)
}

pub async fn get_tasks(gateway: &dyn Gateway, list_id: &str, user_id: &str) -> Result<Vec<Task>> {
    require_member(gateway, list_id, user_id).await?;
    Ok(gateway.tasks_for_list(list_id).await?)
}

pub async fn update_task(
    gateway: &dyn Gateway,
    task_id: &str,
    title: Option<&str>,
    description: Option<&str>,
    user_id: &str,
) -> Result<Task> {
    let title = title.map(check_title).transpose()?;
    task_for_member(gateway, task_id, user_id).await?;

    let patch = TaskPatch {
        title,
        description: description.map(|d| d.trim().to_string()),
        ..TaskPatch::default()
    };
    Ok(gateway.update_task(task_id, patch).await?)
}

/// Patch that moves a task to `completed`, stamping or clearing who did it.
pub fn completion_patch(completed: bool, user_id: &str) -> TaskPatch {
    TaskPatch {
        completed: Some(completed),
        completed_at: Some(completed.then(time_now)),
        completed_by: Some(completed.then(|| user_id.to_string())),
        ..TaskPatch::default()
    }
}

pub async fn toggle_task_completion(
    gateway: &dyn Gateway,
    task_id: &str,
    completed: bool,
    user_id: &str,
) -> Result<Task> {
    task_for_member(gateway, task_id, user_id).await?;
    Ok(gateway
        .update_task(task_id, completion_patch(completed, user_id))
        .await?)
}

pub async fn delete_task(gateway: &dyn Gateway, task_id: &str, user_id: &str) -> Result<()> {
    task_for_member(gateway, task_id, user_id).await?;
    gateway.delete_task(task_id).await?;
    info!(task_id, "task deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryGateway;
    use crate::services::lists::create_list;

    #[tokio::test]
    async fn test_completion_is_stamped_and_cleared() {
        let gw = MemoryGateway::new();
        let list = create_list(&gw, "L1", "", "alice").await.unwrap();
        let task = create_task(&gw, &list.id, "Milk", "", "alice").await.unwrap();

        let done = toggle_task_completion(&gw, &task.id, true, "alice")
            .await
            .unwrap();
        assert!(done.completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.completed_by.as_deref(), Some("alice"));

        let undone = toggle_task_completion(&gw, &task.id, false, "alice")
            .await
            .unwrap();
        assert!(!undone.completed);
        assert!(undone.completed_at.is_none());
        assert!(undone.completed_by.is_none());
    }

    #[tokio::test]
    async fn test_tasks_are_newest_first_and_members_only() {
        let gw = MemoryGateway::new();
        let list = create_list(&gw, "L1", "", "alice").await.unwrap();
        create_task(&gw, &list.id, "first", "", "alice").await.unwrap();
        create_task(&gw, &list.id, "second", "", "alice").await.unwrap();

        let tasks = get_tasks(&gw, &list.id, "alice").await.unwrap();
        assert_eq!(tasks[0].title, "second");

        assert!(matches!(
            create_task(&gw, &list.id, "sneaky", "", "mallory").await,
            Err(Error::AccessDenied)
        ));
        assert!(matches!(
            delete_task(&gw, &tasks[0].id, "mallory").await,
            Err(Error::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn test_update_only_touches_given_fields() {
        let gw = MemoryGateway::new();
        let list = create_list(&gw, "L1", "", "alice").await.unwrap();
        let task = create_task(&gw, &list.id, "Milk", "2 litres", "alice")
            .await
            .unwrap();

        let updated = update_task(&gw, &task.id, Some("Oat milk"), None, "alice")
            .await
            .unwrap();
        assert_eq!(updated.title, "Oat milk");
        assert_eq!(updated.description, "2 litres");
    }
}
