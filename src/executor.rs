use futures::future::{BoxFuture, FutureExt};
use futures::task::{waker_ref, ArcWake, Context, Poll};
use futures_channel::oneshot;
use queues::{IsQueue, Queue};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::tb_obj::TbObj;
use crate::value::Val;
use crate::TbResult;

/// Ready queue and task registry of one simulation.
#[derive(Clone)]
pub(crate) struct Executor {
    ready: TbObj<Queue<Arc<Task>>>,
    tasks: TbObj<Vec<Weak<Task>>>,
}

impl Executor {
    pub(crate) fn new() -> Self {
        Self {
            ready: TbObj::new(Queue::new()),
            tasks: TbObj::new(Vec::new()),
        }
    }

    fn schedule_task(&self, task: Arc<Task>) {
        // Queue::add only fails for bounded queues
        let _ = self.ready.get().add(task);
    }

    fn next_task(&self) -> Option<Arc<Task>> {
        self.ready.get().remove().ok()
    }

    /// Polls scheduled tasks until none is ready.
    pub(crate) fn run_once(&self) {
        while let Some(task) = self.next_task() {
            task.process();
        }
    }

    pub(crate) fn spawn_from_future(
        &self,
        future: impl Future<Output = TbResult> + Send + 'static,
        name: &str,
    ) -> JoinHandle {
        let (tx, rx) = oneshot::channel::<TbResult>();
        let task = Arc::new(Task {
            future: Mutex::new(Some(future.boxed())),
            state: Mutex::new(TaskState::Pending),
            name: name.to_string(),
            join_tx: Mutex::new(Some(tx)),
            executor: self.clone(),
        });
        self.tasks.with_mut(|tasks| {
            tasks.retain(|t| t.strong_count() > 0);
            tasks.push(Arc::downgrade(&task));
        });
        self.schedule_task(task.clone());
        JoinHandle {
            awaited_task: Some(task),
            join_rx: rx,
        }
    }

    /// Cancels every task spawned on this executor and empties the ready queue.
    /// Dropping the futures breaks the reference cycles between tasks and their wakers.
    pub(crate) fn tear_down(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.get());
        for task in tasks.iter().filter_map(Weak::upgrade) {
            task.cancel();
        }
        *self.ready.get() = Queue::new();
    }

    pub(crate) fn live_tasks(&self) -> usize {
        self.tasks.get().iter().filter(|t| t.strong_count() > 0).count()
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
enum TaskState {
    Pending,
    Done,
    Cancelled,
}

pub struct Task {
    future: Mutex<Option<BoxFuture<'static, TbResult>>>,
    state: Mutex<TaskState>,
    name: String,
    join_tx: Mutex<Option<oneshot::Sender<TbResult>>>,
    executor: Executor,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> TaskState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: TaskState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn process(self: &Arc<Self>) {
        if self.state() != TaskState::Pending {
            // cancelled or completed tasks may still be woken by stale triggers
            return;
        }
        let mut fut_slot = self.future.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut fut) = fut_slot.take() {
            let waker = waker_ref(self);
            let context = &mut Context::from_waker(&waker);
            match fut.as_mut().poll(context) {
                Poll::Pending => {
                    if self.state() == TaskState::Pending {
                        *fut_slot = Some(fut);
                    }
                }
                Poll::Ready(result) => {
                    drop(fut_slot);
                    self.set_state(TaskState::Done);
                    let tx = self
                        .join_tx
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take();
                    if let Some(tx) = tx {
                        let _ = tx.send(result);
                    }
                }
            }
        }
    }

    pub fn cancel(&self) {
        // set state to Cancelled, the executor skips the task if it is still woken
        self.set_state(TaskState::Cancelled);
        // the slot is locked while the task polls itself; the future is then dropped by process()
        let fut = match self.future.try_lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        drop(fut);
        let tx = self
            .join_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(tx);
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if arc_self.state() == TaskState::Pending {
            arc_self.executor.schedule_task(arc_self.clone());
        }
    }
}

pub struct JoinHandle {
    awaited_task: Option<Arc<Task>>,
    join_rx: oneshot::Receiver<TbResult>,
}

impl JoinHandle {
    pub fn cancel(mut self) {
        // take awaited_task, cancel it and drop its reference
        if let Some(task) = self.awaited_task.take() {
            task.cancel();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.awaited_task
            .as_ref()
            .map_or(true, |t| t.state() != TaskState::Pending)
    }

    pub fn name(&self) -> Option<&str> {
        self.awaited_task.as_ref().map(|t| t.name())
    }
}

impl Future for JoinHandle {
    type Output = TbResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Val::String("task was cancelled".to_string()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn spawned_tasks_run_in_order() {
        let exec = Executor::new();
        let log = TbObj::new(Vec::new());
        for i in 0..3 {
            let log = log.clone();
            let _ = exec.spawn_from_future(
                async move {
                    log.with_mut(|l| l.push(i));
                    Ok(Val::None)
                },
                "t",
            );
        }
        exec.run_once();
        assert_eq!(*log.get(), vec![0, 1, 2]);
    }

    #[test]
    fn join_handle_delivers_result() {
        let exec = Executor::new();
        let inner = exec.spawn_from_future(async { Ok(Val::Int(7)) }, "inner");
        let out = TbObj::new(None);
        let out2 = out.clone();
        let _ = exec.spawn_from_future(
            async move {
                let r = inner.await;
                out2.with_mut(|o| *o = Some(r));
                Ok(Val::None)
            },
            "outer",
        );
        exec.run_once();
        assert_eq!(*out.get(), Some(Ok(Val::Int(7))));
    }

    #[test]
    fn cancelled_task_never_runs() {
        let exec = Executor::new();
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        let handle = exec.spawn_from_future(
            async move {
                h.fetch_add(1, Ordering::Relaxed);
                Ok(Val::None)
            },
            "victim",
        );
        handle.cancel();
        exec.run_once();
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn tear_down_resolves_joins_as_cancelled() {
        let exec = Executor::new();
        let (_tx, rx) = oneshot::channel::<()>();
        let pending = exec.spawn_from_future(
            async move {
                let _ = rx.await;
                Ok(Val::None)
            },
            "blocked",
        );
        exec.run_once();
        assert_eq!(exec.live_tasks(), 1);
        exec.tear_down();
        assert!(pending.is_finished());
    }
}
