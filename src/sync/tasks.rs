use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::gateway::{Gateway, Subscription};
use crate::models::task::{Task, TaskChange};
use crate::services::tasks as task_service;
use crate::sync::reducer::{Change, Collection, Tagged};

/// Live view of one list's tasks for one user.
pub struct TaskSync {
    gateway: Arc<dyn Gateway>,
    user_id: String,
    list_id: Option<String>,
    feed: Option<Subscription<TaskChange>>,
    tasks: Collection<Task>,
}

impl TaskSync {
    pub fn new(gateway: Arc<dyn Gateway>, user_id: impl Into<String>) -> Self {
        Self {
            gateway,
            user_id: user_id.into(),
            list_id: None,
            feed: None,
            tasks: Collection::new(),
        }
    }

    pub fn list_id(&self) -> Option<&str> {
        self.list_id.as_deref()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.snapshot()
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Subscribes first so nothing between the load and the feed is lost.
    pub async fn open(&mut self, list_id: &str) -> Result<()> {
        self.close();
        let feed = self.gateway.subscribe_tasks(list_id).await?;
        let rows = task_service::get_tasks(self.gateway.as_ref(), list_id, &self.user_id).await?;

        self.tasks.reset(rows);
        self.feed = Some(feed);
        self.list_id = Some(list_id.to_string());
        debug!(list_id, tasks = self.tasks.len(), "task sync opened");
        Ok(())
    }

    pub async fn switch_list(&mut self, list_id: &str) -> Result<()> {
        self.open(list_id).await
    }

    pub fn close(&mut self) {
        if let Some(list_id) = self.list_id.take() {
            debug!(%list_id, "task sync closed");
        }
        self.feed = None;
        self.tasks.clear();
    }

    /// Waits for one pushed change and applies it. `false` once the feed is
    /// gone.
    pub async fn next_event(&mut self) -> bool {
        let Some(feed) = self.feed.as_mut() else {
            return false;
        };
        match feed.recv().await {
            Some(change) => {
                let list_id = match &change {
                    TaskChange::Insert(t) | TaskChange::Update(t) | TaskChange::Delete(t) => {
                        t.list_id.clone()
                    }
                };
                self.apply_for(&list_id, Tagged::from(change));
                true
            }
            None => {
                warn!(list_id = ?self.list_id, "task feed ended");
                self.feed = None;
                false
            }
        }
    }

    /// Drops results that belong to a list this view no longer shows.
    fn apply_for(&mut self, list_id: &str, event: Tagged<Task>) -> bool {
        if self.list_id.as_deref() != Some(list_id) {
            debug!(list_id, "dropping change for a list no longer shown");
            return false;
        }
        self.tasks.apply(event)
    }

    fn current_list(&self) -> Result<String> {
        self.list_id.clone().ok_or(Error::NotFound)
    }

    pub async fn create_task(&mut self, title: &str, description: &str) -> Result<Task> {
        let list_id = self.current_list()?;
        let task = task_service::create_task(
            self.gateway.as_ref(),
            &list_id,
            title,
            description,
            &self.user_id,
        )
        .await?;

        self.apply_for(&list_id, Tagged::confirmed(Change::Insert(task.clone())));
        Ok(task)
    }

    pub async fn toggle_completion(&mut self, task_id: &str) -> Result<Task> {
        let list_id = self.current_list()?;
        let previous = self.tasks.get(task_id).cloned().ok_or(Error::NotFound)?;
        let completed = !previous.completed;

        let mut optimistic = previous.clone();
        task_service::completion_patch(completed, &self.user_id).apply(&mut optimistic);
        self.apply_for(&list_id, Tagged::optimistic(Change::Update(optimistic)));

        match task_service::toggle_task_completion(
            self.gateway.as_ref(),
            task_id,
            completed,
            &self.user_id,
        )
        .await
        {
            Ok(task) => {
                self.apply_for(&list_id, Tagged::confirmed(Change::Update(task.clone())));
                Ok(task)
            }
            Err(error) => {
                warn!(%error, task_id, "toggle failed, rolling back");
                self.apply_for(&list_id, Tagged::confirmed(Change::Update(previous)));
                Err(error)
            }
        }
    }

    pub async fn delete_task(&mut self, task_id: &str) -> Result<()> {
        let list_id = self.current_list()?;
        self.apply_for(&list_id, Tagged::optimistic(Change::Delete(task_id.to_string())));

        match task_service::delete_task(self.gateway.as_ref(), task_id, &self.user_id).await {
            Ok(()) => {
                self.apply_for(&list_id, Tagged::confirmed(Change::Delete(task_id.to_string())));
                Ok(())
            }
            Err(error) => {
                warn!(%error, task_id, "delete failed, reloading list");
                if let Ok(rows) = self.gateway.tasks_for_list(&list_id).await {
                    if self.list_id.as_deref() == Some(list_id.as_str()) {
                        self.tasks.reset(rows);
                    }
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryGateway;
    use crate::models::task::CreateTask;
    use crate::services::lists::create_list;
    use crate::utils::time::time_now;

    async fn setup() -> (Arc<MemoryGateway>, String, String) {
        let gw = Arc::new(MemoryGateway::new());
        let l1 = create_list(gw.as_ref(), "L1", "", "alice").await.unwrap().id;
        let l2 = create_list(gw.as_ref(), "L2", "", "alice").await.unwrap().id;
        (gw, l1, l2)
    }

    fn new_task(list_id: &str, title: &str) -> CreateTask {
        CreateTask {
            list_id: list_id.into(),
            title: title.into(),
            description: String::new(),
            completed: false,
            created_by: "bob".into(),
            created_at: time_now(),
        }
    }

    #[tokio::test]
    async fn test_own_create_and_its_echo_give_one_row() {
        let (gw, l1, _) = setup().await;
        let mut sync = TaskSync::new(gw.clone(), "alice");
        sync.open(&l1).await.unwrap();

        sync.create_task("Milk", "").await.unwrap();
        assert!(sync.next_event().await);
        assert_eq!(sync.tasks().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_changes_are_applied() {
        let (gw, l1, _) = setup().await;
        let mut sync = TaskSync::new(gw.clone(), "alice");
        sync.open(&l1).await.unwrap();

        let task = gw.create_task(new_task(&l1, "Eggs")).await.unwrap();
        assert!(sync.next_event().await);
        assert_eq!(sync.tasks()[0].title, "Eggs");

        gw.delete_task(&task.id).await.unwrap();
        assert!(sync.next_event().await);
        assert!(sync.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_switch_list_only_sees_the_new_list() {
        let (gw, l1, l2) = setup().await;
        let mut sync = TaskSync::new(gw.clone(), "alice");
        sync.open(&l1).await.unwrap();
        sync.switch_list(&l2).await.unwrap();

        gw.create_task(new_task(&l1, "old list")).await.unwrap();
        gw.create_task(new_task(&l2, "new list")).await.unwrap();
        assert!(sync.next_event().await);

        assert_eq!(sync.list_id(), Some(l2.as_str()));
        let titles: Vec<_> = sync.tasks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["new list"]);
    }

    #[tokio::test]
    async fn test_toggle_rolls_back_on_failure() {
        let (gw, l1, _) = setup().await;
        let mut sync = TaskSync::new(gw.clone(), "alice");
        sync.open(&l1).await.unwrap();
        let task = sync.create_task("Milk", "").await.unwrap();

        let done = sync.toggle_completion(&task.id).await.unwrap();
        assert!(done.completed);
        assert!(sync.task(&task.id).unwrap().completed);

        gw.fail_on("update_task").await;
        assert!(sync.toggle_completion(&task.id).await.is_err());
        assert!(sync.task(&task.id).unwrap().completed);
    }

    #[tokio::test]
    async fn test_failed_delete_restores_row() {
        let (gw, l1, _) = setup().await;
        let mut sync = TaskSync::new(gw.clone(), "alice");
        sync.open(&l1).await.unwrap();
        let task = sync.create_task("Milk", "").await.unwrap();

        gw.fail_on("delete_task").await;
        assert!(sync.delete_task(&task.id).await.is_err());
        assert!(sync.task(&task.id).is_some());

        gw.recover("delete_task").await;
        sync.delete_task(&task.id).await.unwrap();
        assert!(sync.task(&task.id).is_none());
    }

    #[tokio::test]
    async fn test_closed_sync_stops() {
        let (gw, l1, _) = setup().await;
        let mut sync = TaskSync::new(gw, "alice");
        sync.open(&l1).await.unwrap();
        sync.close();
        assert!(!sync.next_event().await);
        assert!(sync.tasks().is_empty());
        assert!(sync.create_task("late", "").await.is_err());
    }
}
