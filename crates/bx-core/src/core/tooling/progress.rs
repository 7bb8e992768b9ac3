use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

pub(crate) fn progress_enabled() -> bool {
    match env::var("BX_PROGRESS") {
        Ok(value) => value != "0",
        Err(_) => io::stderr().is_terminal(),
    }
}

static OUTPUT_LOCK: Mutex<()> = Mutex::new(());
static MANAGER: OnceLock<ProgressManager> = OnceLock::new();

fn manager() -> &'static ProgressManager {
    MANAGER.get_or_init(ProgressManager::new)
}

fn clear_progress_line() {
    let _guard = OUTPUT_LOCK.lock().ok();
    let _ = io::stderr().write_all(b"\r\x1b[2K");
    let _ = io::stderr().flush();
}

#[derive(Clone)]
struct ProgressTask {
    id: u64,
    label: String,
    total: Option<usize>,
    current: usize,
    started_at: Instant,
}

struct ProgressManager {
    state: Mutex<ProgressState>,
}

struct ProgressState {
    next_id: u64,
    tasks: Vec<ProgressTask>,
    renderer_started: bool,
}

impl ProgressManager {
    fn new() -> Self {
        Self {
            state: Mutex::new(ProgressState {
                next_id: 1,
                tasks: Vec::new(),
                renderer_started: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_renderer(&self) {
        let mut state = self.state();
        if state.renderer_started {
            return;
        }
        state.renderer_started = true;
        drop(state);

        thread::spawn(|| {
            const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
            const TICK: Duration = Duration::from_millis(80);
            const START_DELAY: Duration = Duration::from_millis(120);
            let mut idx = 0usize;
            let mut rendered = false;
            loop {
                let task = manager().state().tasks.last().cloned();
                let Some(task) = task.filter(|task| task.started_at.elapsed() >= START_DELAY)
                else {
                    if rendered {
                        clear_progress_line();
                        rendered = false;
                    }
                    thread::sleep(TICK);
                    continue;
                };

                let frame = FRAMES[idx % FRAMES.len()];
                idx = idx.wrapping_add(1);
                let line = match task.total {
                    Some(total) => format!(
                        "\r\x1b[2Kbx ▸ {} [{}/{total}] {frame}",
                        task.label,
                        task.current.min(total)
                    ),
                    None => format!("\r\x1b[2Kbx ▸ {} {frame}", task.label),
                };
                {
                    let _guard = OUTPUT_LOCK.lock().ok();
                    let _ = io::stderr().write_all(line.as_bytes());
                    let _ = io::stderr().flush();
                }
                rendered = true;
                thread::sleep(TICK);
            }
        });
    }

    fn push_task(&self, label: String, total: Option<usize>) -> u64 {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id = state.next_id.saturating_add(1);
        state.tasks.push(ProgressTask {
            id,
            label,
            total,
            current: 0,
            started_at: Instant::now(),
        });
        id
    }

    fn update_current(&self, id: u64, delta: usize) {
        let mut state = self.state();
        if let Some(task) = state.tasks.iter_mut().find(|task| task.id == id) {
            task.current = task.current.saturating_add(delta);
        }
    }

    fn remove_task(&self, id: u64) {
        let mut state = self.state();
        if let Some(pos) = state.tasks.iter().position(|task| task.id == id) {
            state.tasks.remove(pos);
        }
    }
}

/// Spinner or counted bar on stderr; a no-op when progress is disabled.
pub struct ProgressReporter {
    id: Option<u64>,
}

impl ProgressReporter {
    pub fn spinner(label: impl Into<String>) -> Self {
        Self::start(label.into(), None)
    }

    pub fn bar(label: impl Into<String>, total: usize) -> Self {
        if total == 0 {
            return Self::spinner(label);
        }
        Self::start(label.into(), Some(total))
    }

    fn start(label: String, total: Option<usize>) -> Self {
        if !progress_enabled() {
            return Self { id: None };
        }
        manager().start_renderer();
        Self {
            id: Some(manager().push_task(label, total)),
        }
    }

    pub fn increment(&self) {
        if let Some(id) = self.id {
            manager().update_current(id, 1);
        }
    }

    pub fn finish(mut self, message: impl Into<String>) {
        let was_enabled = self.id.is_some();
        self.stop();
        if was_enabled {
            eprintln!("bx ▸ {}", message.into());
        }
    }

    fn stop(&mut self) {
        if let Some(id) = self.id.take() {
            manager().remove_task(id);
            clear_progress_line();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
