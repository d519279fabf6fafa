use cowfork_abi::{DEFAULT_PRIORITY, FORK_FAILED, PAGE_SIZE};
use cowfork_kernel::Kernel;
use cowfork_kernel::file::Inode;
use cowfork_kernel::fork::{self, ForkError};
use cowfork_kernel::memory::{FramePool, MemoryError, PageTableEntry};
use cowfork_kernel::process::{PidAllocator, Process, ProcessId, ProcessState, ResumeContext};
use cowfork_kernel::scheduler::Scheduler;

cowfork_kernel::test_harness!(
    child_shares_every_frame_read_only,
    reference_counts_match_entries,
    child_scalar_state,
    child_has_independent_bitmap,
    child_resume_context,
    inherited_files_are_counted,
    fork_of_fork_shares_three_ways,
    failed_increment_rolls_back,
    sys_fork_returns_child_pid,
    sys_fork_without_running_process_fails,
    unknown_parent_leaves_no_trace
);

fn kernel_with_parent(pages: usize) -> (Kernel, ProcessId) {
    let mut kernel = Kernel::default();
    let parent = kernel.spawn("parent").unwrap();
    kernel.map_user_pages(parent, pages).unwrap();
    (kernel, parent)
}

fn child_shares_every_frame_read_only() {
    let (mut kernel, parent) = kernel_with_parent(4);
    let before: Vec<_> = kernel
        .process(parent)
        .unwrap()
        .page_table()
        .iter()
        .map(|(vaddr, entry)| (vaddr, entry.frame, kernel.frames().ref_count(entry.frame)))
        .collect();

    let child = kernel.fork(parent).unwrap();

    let parent_table = kernel.process(parent).unwrap().page_table();
    let child_table = kernel.process(child).unwrap().page_table();
    assert_eq!(child_table.len(), before.len());
    for (vaddr, frame, count) in before {
        assert_eq!(*parent_table.lookup(vaddr).unwrap(), PageTableEntry::shared(frame));
        assert_eq!(*child_table.lookup(vaddr).unwrap(), PageTableEntry::shared(frame));
        assert_eq!(kernel.frames().ref_count(frame), count.map(|c| c + 1));
    }
}

fn reference_counts_match_entries() {
    let (mut kernel, parent) = kernel_with_parent(3);
    let child = kernel.fork(parent).unwrap();
    kernel.fork(child).unwrap();
    let start = kernel.process(parent).unwrap().vaddr().start();
    kernel.write(child, start, &[1]).unwrap();

    assert!(kernel.reference_counts_consistent());
    for process in kernel.scheduler().processes() {
        for (_, entry) in process.page_table().iter() {
            assert_eq!(
                kernel.frames().ref_count(entry.frame),
                Some(kernel.count_frame_references(entry.frame))
            );
        }
    }
}

fn child_scalar_state() {
    let (mut kernel, parent) = kernel_with_parent(1);
    kernel.switch_to(parent).unwrap();
    let process = kernel.process_mut(parent).unwrap();
    process.set_priority(20);
    process.tick();
    process.tick();

    let child = kernel.fork(parent).unwrap();
    let child = kernel.process(child).unwrap();
    assert_ne!(child.id(), parent);
    assert_eq!(child.parent_id(), Some(parent));
    assert_eq!(child.name(), "parent_fork");
    assert_eq!(child.state(), ProcessState::Ready);
    assert_eq!(child.elapsed_ticks(), 0);
    assert_eq!(child.priority(), 20);
    assert_eq!(child.ticks(), 20);
    assert_eq!(kernel.process(parent).unwrap().elapsed_ticks(), 2);
}

fn child_has_independent_bitmap() {
    let (mut kernel, parent) = kernel_with_parent(2);
    let child = kernel.fork(parent).unwrap();
    assert_eq!(
        kernel.process(child).unwrap().vaddr(),
        kernel.process(parent).unwrap().vaddr()
    );

    kernel.map_user_pages(child, 1).unwrap();
    assert_eq!(kernel.process(parent).unwrap().vaddr().bitmap().count_set(), 2);
    assert_eq!(kernel.process(child).unwrap().vaddr().bitmap().count_set(), 3);
    assert_eq!(kernel.process(parent).unwrap().page_table().len(), 2);
}

fn child_resume_context() {
    let (mut kernel, parent) = kernel_with_parent(1);
    let child = kernel.fork(parent).unwrap();
    assert_eq!(
        kernel.process(child).unwrap().context(),
        Some(&ResumeContext::forked_child())
    );
    assert_eq!(kernel.process(child).unwrap().context().unwrap().return_value, 0);
}

fn inherited_files_are_counted() {
    let (mut kernel, parent) = kernel_with_parent(1);
    let a = Inode::new(1);
    let b = Inode::new(2);
    let process = kernel.process_mut(parent).unwrap();
    process.open_file(a.clone(), 0);
    process.open_file(a.clone(), 0);
    process.open_file(b.clone(), 0);

    let child = kernel.fork(parent).unwrap();
    assert_eq!(a.open_count(), 4);
    assert_eq!(b.open_count(), 2);

    kernel.exit(child, 0).unwrap();
    assert_eq!(a.open_count(), 2);
    assert_eq!(b.open_count(), 1);
}

fn fork_of_fork_shares_three_ways() {
    let (mut kernel, parent) = kernel_with_parent(1);
    let child = kernel.fork(parent).unwrap();
    let grandchild = kernel.fork(child).unwrap();

    let start = kernel.process(parent).unwrap().vaddr().start();
    let frame = kernel.process(parent).unwrap().page_table().lookup(start).unwrap().frame;
    assert_eq!(kernel.frames().ref_count(frame), Some(3));
    assert_eq!(
        kernel.process(grandchild).unwrap().parent_id(),
        Some(child)
    );
    assert_eq!(kernel.process(grandchild).unwrap().name(), "parent_fork_fork");

    kernel.exit(grandchild, 0).unwrap();
    kernel.exit(child, 0).unwrap();
    assert_eq!(kernel.frames().ref_count(frame), Some(1));
    assert!(kernel.reference_counts_consistent());
}

fn failed_increment_rolls_back() {
    let frames = FramePool::new();
    let pids = PidAllocator::new();
    let mut scheduler = Scheduler::new();

    let mut parent = Process::new("parent");
    parent.set_id(pids.next_pid().unwrap());
    let start = parent.map_user_pages(&frames, 3).unwrap();

    // A mapping whose frame has already gone back to the pool.
    let dead = frames.allocate().unwrap();
    frames.decrement_ref(dead);
    let bogus = start + (3 * PAGE_SIZE) as u64;
    parent
        .page_table_mut()
        .insert(bogus, PageTableEntry::writable(dead));
    let parent = scheduler.add_ready(parent);

    assert_eq!(
        fork::fork(&mut scheduler, &frames, &pids, parent),
        Err(ForkError::Memory(MemoryError::InvalidFrame))
    );

    assert_eq!(scheduler.len(), 1);
    let queued: Vec<_> = scheduler.ready_queue().collect();
    assert_eq!(queued, vec![parent]);
    for (vaddr, entry) in scheduler.get(parent).unwrap().page_table().iter() {
        assert!(!entry.read_only, "{vaddr:?} lost write access");
        if vaddr != bogus {
            assert_eq!(frames.ref_count(entry.frame), Some(1));
        }
    }
    assert_eq!(frames.frames_in_use(), 3);
}

fn sys_fork_returns_child_pid() {
    let (mut kernel, parent) = kernel_with_parent(1);
    kernel.switch_to(parent).unwrap();

    let ret = kernel.sys_fork();
    assert_ne!(ret, FORK_FAILED);
    let child = ProcessId::from_raw(ret as u64);
    assert_eq!(kernel.process(child).unwrap().parent_id(), Some(parent));
    assert_eq!(kernel.scheduler().current(), Some(parent));
}

fn sys_fork_without_running_process_fails() {
    let (mut kernel, _) = kernel_with_parent(1);
    assert_eq!(kernel.sys_fork(), FORK_FAILED);
    assert_eq!(kernel.scheduler().len(), 1);
}

fn unknown_parent_leaves_no_trace() {
    let (mut kernel, parent) = kernel_with_parent(2);
    assert_eq!(
        kernel.fork(ProcessId::from_raw(7)),
        Err(ForkError::ParentNotFound)
    );
    assert_eq!(kernel.scheduler().len(), 1);
    assert!(
        kernel
            .process(parent)
            .unwrap()
            .page_table()
            .iter()
            .all(|(_, entry)| !entry.read_only)
    );
    assert_eq!(kernel.process(parent).unwrap().priority(), DEFAULT_PRIORITY);
}
