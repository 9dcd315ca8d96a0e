mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::TestLoader;
use loaddag::{LoadJob, LoadStatus};

fn noop(_: &Arc<LoadJob>) -> anyhow::Result<()> {
    Ok(())
}

#[test]
fn cancel_pending_job() {
    let t = TestLoader::new(1);

    let job = LoadJob::new("job", vec![], noop);
    let task = t.schedule(vec![job.clone()]);

    // The loader was never started, so the job is still pending.
    task.remove();

    assert_eq!(job.status(), LoadStatus::Canceled);
    let err = job.wait().unwrap_err();
    assert!(err.is_canceled());
}

#[test]
fn cancel_pending_task_cancels_dependents() {
    let t = TestLoader::new(1);

    let job1 = LoadJob::new("job1", vec![], noop);
    let job2 = LoadJob::new("job2", vec![job1.clone()], noop);
    let task = t.schedule(vec![job1.clone(), job2.clone()]);

    task.remove();

    assert_eq!(job1.status(), LoadStatus::Canceled);
    assert_eq!(job2.status(), LoadStatus::Canceled);
    assert!(job1.wait().unwrap_err().is_canceled());
    assert!(job2.wait().unwrap_err().is_canceled());
}

#[test]
fn cancel_pending_dependency_crosses_tasks() {
    let t = TestLoader::new(1);

    let job1 = LoadJob::new("job1", vec![], noop);
    let job2 = LoadJob::new("job2", vec![job1.clone()], noop);
    let task1 = t.schedule(vec![job1.clone()]);
    let _task2 = t.schedule(vec![job2.clone()]);

    // Removing task1 cancels job2 as well, through the dependency edge.
    task1.remove();

    assert_eq!(job1.status(), LoadStatus::Canceled);
    assert_eq!(job2.status(), LoadStatus::Canceled);
    assert!(job1.wait().unwrap_err().is_canceled());
    assert!(job2.wait().unwrap_err().is_canceled());
}

#[test]
fn executing_job_survives_remove() {
    let t = TestLoader::new(1);
    t.loader.start();

    let sync = Arc::new(Barrier::new(2));
    let job = LoadJob::new("job", vec![], {
        let sync = sync.clone();
        move |_: &Arc<LoadJob>| -> anyhow::Result<()> {
            sync.wait(); // job started executing
            sync.wait(); // released once the canceler is blocked on us
            Ok(())
        }
    });
    let task = t.schedule(vec![job.clone()]);

    sync.wait(); // wait for the job to start executing
    thread::scope(|s| {
        let canceler = s.spawn(|| task.remove());
        while job.waiters_count() == 0 {
            thread::yield_now();
        }
        // Still executing: remove() does not interrupt it.
        assert_eq!(job.status(), LoadStatus::Pending);
        sync.wait();
        canceler.join().unwrap();
    });

    assert_eq!(job.status(), LoadStatus::Ok);
    job.wait().unwrap();
}

#[test]
fn remove_cancels_pending_but_not_executing_members() {
    let t = TestLoader::new(16);
    t.loader.start();

    // Several iterations to shake out dispatch races.
    for _ in 0..5 {
        let sync = Arc::new(Barrier::new(2));
        let blocker = LoadJob::new("blocker_job", vec![], {
            let sync = sync.clone();
            move |_: &Arc<LoadJob>| -> anyhow::Result<()> {
                sync.wait();
                sync.wait();
                Ok(())
            }
        });

        let mut task1_jobs = vec![blocker.clone()];
        for _ in 0..100 {
            task1_jobs.push(LoadJob::new("job_to_cancel", vec![blocker.clone()], noop));
        }
        let task1 = t.schedule(task1_jobs.clone());

        let job_to_succeed = LoadJob::new("job_to_succeed", vec![blocker.clone()], noop);
        let _task2 = t.schedule(vec![job_to_succeed.clone()]);

        sync.wait(); // blocker is executing
        thread::scope(|s| {
            let canceler = s.spawn(|| task1.remove());
            while blocker.waiters_count() == 0 {
                thread::yield_now();
            }
            assert_eq!(blocker.status(), LoadStatus::Pending);
            sync.wait();
            canceler.join().unwrap();
        });
        t.loader.wait();

        assert_eq!(blocker.status(), LoadStatus::Ok);
        assert_eq!(job_to_succeed.status(), LoadStatus::Ok);
        for job in &task1_jobs[1..] {
            assert_eq!(job.status(), LoadStatus::Canceled);
        }
    }
}

#[test]
fn remove_is_idempotent() {
    let t = TestLoader::new(1);

    let job1 = LoadJob::new("job1", vec![], noop);
    let job2 = LoadJob::new("job2", vec![job1.clone()], noop);
    let task = t.schedule(vec![job1.clone(), job2.clone()]);

    task.remove();
    let first_error = job2.wait().unwrap_err();

    task.remove();
    task.remove();

    assert_eq!(job1.status(), LoadStatus::Canceled);
    assert_eq!(job2.status(), LoadStatus::Canceled);
    assert_eq!(job2.wait().unwrap_err(), first_error);
}

#[test]
fn detach_leaves_jobs_running() {
    let t = TestLoader::new(2);

    let job1 = LoadJob::new("job1", vec![], noop);
    let job2 = LoadJob::new("job2", vec![job1.clone()], noop);
    {
        let task = t.schedule(vec![job1.clone(), job2.clone()]);
        task.detach();
        // Dropping a detached task must not cancel anything.
    }
    assert_eq!(job1.status(), LoadStatus::Pending);

    t.loader.start();
    job2.wait().unwrap();
    assert_eq!(job1.status(), LoadStatus::Ok);
    assert_eq!(job2.status(), LoadStatus::Ok);
}
