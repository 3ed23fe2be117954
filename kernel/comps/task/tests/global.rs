// SPDX-License-Identifier: MPL-2.0

//! The global scheduler can only be initialized once per process, so this
//! file holds a single test.

use std::{cell::Cell, panic, sync::Arc, thread};

use kestrel_task::{SchedConfig, Task, TaskData};

const NR_CPUS: u64 = 4;

thread_local! {
    static CPU_ID: Cell<Option<u64>> = const { Cell::new(None) };
}

#[test]
fn global_scheduler_life() {
    assert_eq!(kestrel_task::current_task_id(), None);

    let config = SchedConfig::from_cmdline("sched.policy=fifo").unwrap();
    kestrel_task::init(config);
    let sched = kestrel_task::get();
    assert_eq!(sched.policy_name(), "fifo");
    assert_eq!(kestrel_task::current_task_id(), None);

    let init = Arc::new(Task::new(Box::new(String::from("init")) as TaskData).named("init"));
    sched.add_task(init.clone()).unwrap();
    let current = sched.pick_next().unwrap();
    assert_eq!(kestrel_task::current_task_id(), Some(init.id().as_u64()));
    assert_eq!(
        current.payload().downcast_ref::<String>().map(String::as_str),
        Some("init")
    );

    // The lock is free again, so taking it is no self-deadlock.
    assert!(!sched.tick());
    assert!(Arc::ptr_eq(&kestrel_task::get().current().unwrap(), &init));

    // Every CPU contends for the same lock while `init` is current.
    spinlock::inject_cpu_id(|| CPU_ID.get());
    CPU_ID.set(Some(NR_CPUS + 1));
    let cpus: Vec<_> = (1..=NR_CPUS)
        .map(|cpu| {
            thread::spawn(move || {
                CPU_ID.set(Some(cpu));
                let sched = kestrel_task::get();
                for _ in 0..20_000 {
                    assert_eq!(sched.nr_ready(), 0);
                    assert!(!sched.tick());
                }
            })
        })
        .collect();
    for cpu in cpus {
        cpu.join().unwrap();
    }
    assert_eq!(sched.stats().ticks, 1 + 20_000 * NR_CPUS);
    assert_eq!(kestrel_task::current_task_id(), Some(init.id().as_u64()));

    sched.exit_current(0).unwrap();
    assert_eq!(kestrel_task::current_task_id(), None);

    let second_init = panic::catch_unwind(|| kestrel_task::init(SchedConfig::default()));
    assert!(second_init.is_err());
    assert_eq!(kestrel_task::get().policy_name(), "fifo");
}
