/* Real-time setup for paced tick loops (Linux) */

use std::io;

use libc::{
	MCL_CURRENT,
	MCL_FUTURE,
	SCHED_FIFO,
	mlockall,
	sched_get_priority_max,
	sched_param,
	sched_setscheduler,
};

/// lock all current and future pages, so the tick loop never page-faults
pub fn lock_memory() -> io::Result<()> {
	let res = unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) };
	if 0 != res {
		return Err(io::Error::last_os_error());
	}
	Ok(())
}

/// switch the calling process to SCHED_FIFO with the highest priority
pub fn fifo_scheduling() -> io::Result<i32> {
	let priority = unsafe { sched_get_priority_max(SCHED_FIFO) };
	if -1 == priority {
		return Err(io::Error::last_os_error());
	}

	let param = sched_param { sched_priority: priority };
	let res = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };
	if 0 != res {
		return Err(io::Error::last_os_error());
	}
	Ok(priority)
}

/// Both of the above; failures are logged and otherwise ignored (timing
/// just gets less reliable).
pub fn enter() {
	if let Err(e) = lock_memory() {
		warn!("couldn't lock memory: {}", e);
	}
	match fifo_scheduling() {
		Ok(priority) => info!("running with SCHED_FIFO priority {}", priority),
		Err(e) => warn!("couldn't switch to SCHED_FIFO: {}", e),
	}
}
