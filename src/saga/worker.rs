//! Worker host: registers each saga's workflow and activities on its own
//! task queue and waits for both dispatch loops to report readiness.

use std::sync::Arc;

use saga_engine::{ActivityOptions, SagaEngine, Worker, WorkerHandle};

use crate::activities::UserActivities;
use crate::saga::{
    CompensateMoney, CreateEmailRecord, CreateUserRecord, CreateUserWorkflow, DecreaseMoney,
    DeleteEmailRecordIfPresent, DeleteUserRecordIfPresent, IncreaseMoney, TRANSFER_TASK_QUEUE,
    TransferMoneyWorkflow, USER_TASK_QUEUE,
};

/// Handles of the two running workers.
pub struct WorkerHost {
    user: WorkerHandle,
    transfer: WorkerHandle,
}

impl WorkerHost {
    /// Drain both queues and stop the dispatch loops.
    pub async fn shutdown(self) {
        self.user.shutdown().await;
        self.transfer.shutdown().await;
    }
}

/// Start the registration worker and the transfer worker, returning once
/// both dispatch loops are polling their queues.
pub async fn start_workers(
    engine: &Arc<SagaEngine>,
    activities: Arc<dyn UserActivities>,
    options: ActivityOptions,
) -> WorkerHost {
    let user_worker = Worker::new(Arc::clone(engine), USER_TASK_QUEUE);
    user_worker.register_workflow(CreateUserWorkflow::new(options.clone()));
    user_worker.register_activity(CreateEmailRecord::new(Arc::clone(&activities)));
    user_worker.register_activity(CreateUserRecord::new(Arc::clone(&activities)));
    user_worker.register_activity(DeleteEmailRecordIfPresent::new(Arc::clone(&activities)));
    user_worker.register_activity(DeleteUserRecordIfPresent::new(Arc::clone(&activities)));
    let mut user = user_worker.start();

    let transfer_worker = Worker::new(Arc::clone(engine), TRANSFER_TASK_QUEUE);
    transfer_worker.register_workflow(TransferMoneyWorkflow::new(options));
    transfer_worker.register_activity(DecreaseMoney::new(Arc::clone(&activities)));
    transfer_worker.register_activity(IncreaseMoney::new(Arc::clone(&activities)));
    transfer_worker.register_activity(CompensateMoney::new(activities));
    let mut transfer = transfer_worker.start();

    user.ready().await;
    transfer.ready().await;
    tracing::info!("user and transfer workers started");

    WorkerHost { user, transfer }
}
