use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, Once, Weak};

use crate::run::RunContext;

static TARGET: Mutex<Option<Weak<RunContext>>> = Mutex::new(None);
static INSTALL: Once = Once::new();

/// Route SIGINT/SIGTERM into the current run's `running` flag.
///
/// The OS handler is process-global and installed at most once; each run
/// re-points `TARGET` at its own context before starting threads, and the
/// weak reference keeps a finished run's context collectable.
pub fn install(ctx: &Arc<RunContext>) {
    *TARGET.lock().unwrap() = Some(Arc::downgrade(ctx));
    INSTALL.call_once(|| {
        let result = ctrlc::set_handler(|| {
            let target = TARGET.lock().unwrap().clone();
            if let Some(ctx) = target.and_then(|weak| weak.upgrade()) {
                println!("ERROR: received termination signal - stopping");
                ctx.running.store(false, Ordering::Relaxed);
            }
        });
        if let Err(err) = result {
            println!("ERROR: couldn't install signal handler: {}", err);
        }
    });
}
