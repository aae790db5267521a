use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use anyhow::anyhow;
use command_executor::command::Command;
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool::ThreadPool;
use command_executor::thread_pool_builder::ThreadPoolBuilder;

/// Bounded thread pool owned by one sort for its whole run.
///
/// Work is submitted through a [Phase]; [Phase::wait] returns only after every command of the
/// phase has finished, which is the barrier between the split phase and each merge pass. The
/// pool is shut down and joined by [WorkerPool::shutdown] or, on early return, when dropped.
pub(crate) struct WorkerPool {
    name: String,
    thread_pool: Option<ThreadPool>,
}

impl WorkerPool {
    pub(crate) fn new(name: &str, tasks: usize, queue_size: usize) -> Result<WorkerPool, anyhow::Error> {
        let mut thread_pool_builder = ThreadPoolBuilder::new();
        let thread_pool = thread_pool_builder
            .with_name(name.to_string())
            .with_tasks(tasks)
            .with_queue_size(queue_size)
            .with_shutdown_mode(ShutdownMode::CompletePending)
            .build()?;
        log::info!("Started {} pool, tasks: {}, queue size: {}", name, tasks, queue_size);
        Ok(
            WorkerPool {
                name: name.to_string(),
                thread_pool: Some(thread_pool),
            }
        )
    }

    pub(crate) fn phase(&mut self, name: &str) -> Result<Phase<'_>, anyhow::Error> {
        let thread_pool = self.thread_pool
            .as_mut()
            .ok_or_else(|| anyhow!("{} pool is shut down", self.name))?;
        log::info!("Start phase {}", name);
        Ok(
            Phase {
                name: name.to_string(),
                thread_pool,
                latch: Arc::new(PhaseLatch::new()),
                submitted: 0,
            }
        )
    }

    pub(crate) fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        if let Some(mut thread_pool) = self.thread_pool.take() {
            log::info!("Shutting down {} pool", self.name);
            thread_pool.shutdown();
            thread_pool.join()?;
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Failed to join {} pool: {}", self.name, e);
        }
    }
}

/// Commands submitted between two barriers.
pub(crate) struct Phase<'a> {
    name: String,
    thread_pool: &'a mut ThreadPool,
    latch: Arc<PhaseLatch>,
    submitted: usize,
}

impl<'a> Phase<'a> {
    /// Queue `command`; blocks while the pool queue is full.
    pub(crate) fn submit<C>(&mut self, command: C)
    where
        C: Command + Send + Sync + 'static,
    {
        self.latch.start();
        self.submitted += 1;
        self.thread_pool.submit(
            Box::new(
                PhaseCommand {
                    command,
                    latch: self.latch.clone(),
                }
            )
        );
    }

    /// True once any command of this phase has failed
    pub(crate) fn has_failed(&self) -> bool {
        self.latch.has_failed()
    }

    /// Wait for every submitted command and return the first failure, if any.
    pub(crate) fn wait(self) -> Result<usize, anyhow::Error> {
        self.latch.wait()
            .map_err(|e| e.context(format!("Phase {} failed", self.name)))?;
        log::info!("Finish phase {}, commands: {}", self.name, self.submitted);
        Ok(self.submitted)
    }
}

#[derive(Default)]
struct PhaseState {
    pending: usize,
    failure: Option<anyhow::Error>,
}

struct PhaseLatch {
    state: Mutex<PhaseState>,
    drained: Condvar,
}

impl PhaseLatch {
    fn new() -> PhaseLatch {
        PhaseLatch {
            state: Mutex::new(PhaseState::default()),
            drained: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PhaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self) {
        self.lock().pending += 1;
    }

    fn finish(&self, result: Result<(), anyhow::Error>) {
        let mut state = self.lock();
        if let Err(e) = result {
            // first failure wins
            if state.failure.is_none() {
                state.failure = Some(e);
            }
        }
        state.pending -= 1;
        if state.pending == 0 {
            self.drained.notify_all();
        }
    }

    fn has_failed(&self) -> bool {
        self.lock().failure.is_some()
    }

    fn wait(&self) -> Result<(), anyhow::Error> {
        let mut state = self.lock();
        while state.pending > 0 {
            state = self.drained.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        match state.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct PhaseCommand<C> {
    command: C,
    latch: Arc<PhaseLatch>,
}

impl<C: Command> Command for PhaseCommand<C> {
    fn execute(&self) -> Result<(), anyhow::Error> {
        let result = catch_unwind(AssertUnwindSafe(|| self.command.execute()))
            .unwrap_or_else(|_| Err(anyhow!("Command panicked, thread: {}", thread::current().name().unwrap_or("unnamed"))));
        if let Err(e) = &result {
            log::error!("Command failed, thread: {}, error: {:#}", thread::current().name().unwrap_or("unnamed"), e);
        }
        self.latch.finish(result);
        Ok(())
    }
}
