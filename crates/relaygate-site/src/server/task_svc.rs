//! Task endpoints: site-side creation and lookup, relay-side polling and
//! result reporting.
//!
//! `poll_tasks`, `complete_task` and `fail_task` are gated on the caller's
//! relay identity. `create_task` and `get_task` are site-admin routes that
//! check no caller identity; the embedding router must keep them off the
//! relay-facing mTLS listener or put its own admin authentication in front.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::instrument;

use super::messages::{
    CreateTaskRequest, CreateTaskResponse, GetTaskRequest, PollTasksRequest, PollTasksResponse,
    TaskResponse, TaskResultRequest,
};
use super::status::{auth_error_to_status, relay_error_to_status, task_error_to_status};
use crate::auth::MtlsAuthValidator;
use crate::relays::RelaysRepository;
use crate::tasks::{TaskStatus, TasksRepository};

#[derive(Debug, Clone)]
pub struct RelayTaskService {
    relays: RelaysRepository,
    tasks: Arc<TasksRepository>,
    validator: MtlsAuthValidator,
}

impl RelayTaskService {
    pub const fn new(relays: RelaysRepository, tasks: Arc<TasksRepository>) -> Self {
        Self {
            relays,
            tasks,
            validator: MtlsAuthValidator::new("relay_id"),
        }
    }

    #[instrument(skip(self, request), fields(rpc = "CreateTask"))]
    pub async fn create_task(
        &self,
        request: Request<CreateTaskRequest>,
    ) -> Result<Response<CreateTaskResponse>, Status> {
        let req = request.into_inner();
        let task_id = self
            .tasks
            .create_task(&req.relay_id, req.spec)
            .await
            .map_err(task_error_to_status)?;

        Ok(Response::new(CreateTaskResponse {
            task_id,
            status: TaskStatus::Pending,
        }))
    }

    /// Pending tasks of the calling relay, oldest first.
    #[instrument(skip(self, request), fields(rpc = "PollTasks"))]
    pub async fn poll_tasks(
        &self,
        request: Request<PollTasksRequest>,
    ) -> Result<Response<PollTasksResponse>, Status> {
        self.validator
            .validate(&request)
            .map_err(auth_error_to_status)?;
        let req = request.into_inner();

        self.relays
            .touch(&req.relay_id)
            .await
            .map_err(relay_error_to_status)?;
        let tasks = self
            .tasks
            .get_tasks(&req.relay_id)
            .await
            .map_err(task_error_to_status)?;

        Ok(Response::new(PollTasksResponse { tasks }))
    }

    #[instrument(skip(self, request), fields(rpc = "CompleteTask"))]
    pub async fn complete_task(
        &self,
        request: Request<TaskResultRequest>,
    ) -> Result<Response<TaskResponse>, Status> {
        self.validator
            .validate(&request)
            .map_err(auth_error_to_status)?;
        let req = request.into_inner();

        let task = self
            .tasks
            .complete_task(&req.relay_id, &req.task_id, req.result)
            .await
            .map_err(task_error_to_status)?;

        Ok(Response::new(TaskResponse { task }))
    }

    #[instrument(skip(self, request), fields(rpc = "FailTask"))]
    pub async fn fail_task(
        &self,
        request: Request<TaskResultRequest>,
    ) -> Result<Response<TaskResponse>, Status> {
        self.validator
            .validate(&request)
            .map_err(auth_error_to_status)?;
        let req = request.into_inner();

        let task = self
            .tasks
            .fail_task(&req.relay_id, &req.task_id, req.result)
            .await
            .map_err(task_error_to_status)?;

        Ok(Response::new(TaskResponse { task }))
    }

    /// Site-side lookup of a task in any status while it is retained.
    #[instrument(skip(self, request), fields(rpc = "GetTask"))]
    pub async fn get_task(
        &self,
        request: Request<GetTaskRequest>,
    ) -> Result<Response<TaskResponse>, Status> {
        let req = request.into_inner();
        self.relays
            .get_relay(&req.relay_id)
            .await
            .map_err(relay_error_to_status)?;

        let task = self
            .tasks
            .get_task(&req.relay_id, &req.task_id)
            .await
            .map_err(task_error_to_status)?;

        Ok(Response::new(TaskResponse { task }))
    }
}
