use std::process::ExitCode;

use cowfork_abi::{FORK_FAILED, PAGE_SIZE};
use cowfork_kernel::process::ProcessId;
use cowfork_kernel::{Kernel, KernelConfig, KernelError};
use log::{error, info};
use x86_64::VirtAddr;

const DEMO_PAGES: usize = 10;
const CHILD_BYTES: [u8; 4] = [1, 2, 3, 4];

fn main() -> ExitCode {
    if let Err(err) = cowfork_kernel::init() {
        eprintln!("failed to install logger: {err}");
        return ExitCode::FAILURE;
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("demo failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), KernelError> {
    let mut kernel = Kernel::new(KernelConfig::default());

    let parent = kernel.spawn("parent")?;
    let start = kernel.map_user_pages(parent, DEMO_PAGES)?;
    for page in 0..DEMO_PAGES {
        let vaddr = start + (page * PAGE_SIZE) as u64;
        let fill: Vec<u8> = (0..PAGE_SIZE).map(|byte| (page + byte) as u8).collect();
        kernel.write(parent, vaddr, &fill)?;
    }
    kernel.switch_to(parent)?;
    info!("parent PID {parent} mapped {DEMO_PAGES} pages at {:#x}", start.as_u64());

    let ret = kernel.sys_fork();
    if ret == FORK_FAILED {
        error!("fork failed");
        return Ok(());
    }
    let child = ProcessId::from_raw(ret as u64);
    info!("fork returned {child} in the parent");

    report_sharing(&kernel, parent, child, start);

    let observed = kernel.switch_to(child)?;
    info!("child PID {child} resumed with return value {observed:?}");

    let outcome = kernel.write(child, start, &CHILD_BYTES)?;
    info!("child wrote {CHILD_BYTES:?} at {:#x}: {outcome:?}", start.as_u64());

    let parent_bytes = kernel.read_at(parent, start, CHILD_BYTES.len())?;
    let child_bytes = kernel.read_at(child, start, CHILD_BYTES.len())?;
    info!("parent sees {parent_bytes:?}, child sees {child_bytes:?}");
    if parent_bytes == CHILD_BYTES {
        error!("child write leaked into the parent");
    } else {
        info!("parent memory unchanged");
    }

    info!(
        "reference counts consistent: {}",
        kernel.reference_counts_consistent()
    );
    Ok(())
}

fn report_sharing(kernel: &Kernel, parent: ProcessId, child: ProcessId, start: VirtAddr) {
    let (Some(parent), Some(child)) = (kernel.process(parent), kernel.process(child)) else {
        return;
    };

    let shared = parent
        .page_table()
        .iter()
        .filter(|(vaddr, entry)| {
            child
                .page_table()
                .lookup(*vaddr)
                .is_some_and(|c| c.frame == entry.frame && c.read_only && entry.read_only)
        })
        .count();
    info!(
        "{} of {} pages from {:#x} shared read-only between {} and {}",
        shared,
        parent.page_table().len(),
        start.as_u64(),
        parent.name(),
        child.name()
    );
}
