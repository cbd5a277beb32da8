//! Integration tests for a single thread service.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use threadservice::{
    AddOption, Context, Identity, ListenOption, MemoryHost, PullOption, PutOption, ServiceConfig,
    ServiceError, ThreadId, ThreadVariant, Threadservice, Timestamp,
};

fn test_service() -> Threadservice {
    Threadservice::in_memory(
        ServiceConfig::default(),
        Identity::generate(),
        Arc::new(MemoryHost::new()),
    )
    .unwrap()
}

fn new_thread() -> ThreadId {
    ThreadId::new(ThreadVariant::AccessControlled)
}

// --- Realistic Workflow Tests ---

#[test]
fn test_first_add_to_unknown_thread() {
    let svc = test_service();
    let ctx = Context::background();
    let thread = new_thread();

    let record = svc
        .add_record(&ctx, b"hello", [AddOption::Thread(thread.clone())])
        .unwrap();

    assert_eq!(record.thread_id(), &thread);
    assert_eq!(record.log_id(), svc.log_id());

    let logs = svc.logs(&thread).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, svc.log_id());
    assert_eq!(logs[0].head, Some(record.cid()));
    assert_eq!(svc.open_record(&record, None).unwrap(), b"hello");
}

#[test]
fn test_chat_thread_workflow() {
    let svc = test_service();
    let ctx = Context::background();
    let thread = new_thread();

    let messages = ["Hello", "How are you?", "Fine, thanks", "Bye"];
    for (i, msg) in messages.iter().enumerate() {
        svc.add_record(
            &ctx,
            msg.as_bytes(),
            [
                AddOption::Thread(thread.clone()),
                AddOption::Time(Timestamp(i as i64)),
            ],
        )
        .unwrap();
    }

    let page = svc.pull(&ctx, &thread, &svc.log_id(), None, []).unwrap();
    assert_eq!(page.len(), messages.len());

    for (i, (record, msg)) in page.iter().zip(messages).enumerate() {
        assert_eq!(svc.open_record(record, None).unwrap(), msg.as_bytes());
        assert_eq!(record.value().time, Timestamp(i as i64));
    }
    assert_eq!(page[0].value().prev, None);
}

#[test]
fn test_pull_pages_resume_from_last_cid() {
    let svc = test_service();
    let ctx = Context::background();
    let thread = new_thread();
    let log = svc.log_id();

    let added: Vec<_> = (0..10)
        .map(|i| {
            svc.add_record(
                &ctx,
                format!("{i}").as_bytes(),
                [AddOption::Thread(thread.clone())],
            )
            .unwrap()
            .cid()
        })
        .collect();

    let mut pulled = Vec::new();
    let mut offset = None;
    loop {
        let page = svc
            .pull(&ctx, &thread, &log, offset.as_ref(), [PullOption::Limit(3)])
            .unwrap();
        if page.is_empty() {
            break;
        }
        assert!(page.len() <= 3);
        offset = page.last().map(|r| r.cid());
        pulled.extend(page.iter().map(|r| r.cid()));
    }

    assert_eq!(pulled, added);
}

#[test]
fn test_pull_uses_configured_page_size() {
    let svc = Threadservice::in_memory(
        ServiceConfig {
            page_size: 4,
            ..Default::default()
        },
        Identity::generate(),
        Arc::new(MemoryHost::new()),
    )
    .unwrap();
    let ctx = Context::background();
    let thread = new_thread();

    for _ in 0..6 {
        svc.add_record(&ctx, b"x", [AddOption::Thread(thread.clone())])
            .unwrap();
    }

    let page = svc.pull(&ctx, &thread, &svc.log_id(), None, []).unwrap();
    assert_eq!(page.len(), 4);
}

#[test]
fn test_pull_from_head_is_empty() {
    let svc = test_service();
    let ctx = Context::background();
    let record = svc.add_record(&ctx, b"only", []).unwrap();

    let page = svc
        .pull(
            &ctx,
            record.thread_id(),
            &record.log_id(),
            Some(&record.cid()),
            [],
        )
        .unwrap();
    assert!(page.is_empty());
}

#[test]
fn test_get_record_returns_stored_record() {
    let svc = test_service();
    let ctx = Context::background();
    let record = svc.add_record(&ctx, b"lookup", []).unwrap();

    let fetched = svc
        .get_record(&ctx, record.thread_id(), &record.log_id(), &record.cid())
        .unwrap();
    assert_eq!(fetched, record);
}

#[test]
fn test_put_record_from_other_author() {
    let a = test_service();
    let b = test_service();
    let ctx = Context::background();
    let thread = new_thread();

    a.add_record(&ctx, b"from a", [AddOption::Thread(thread.clone())])
        .unwrap();
    let sub = a.subscribe([ListenOption::Thread(thread.clone())]);

    let first = b
        .add_record(&ctx, b"from b", [AddOption::Thread(thread.clone())])
        .unwrap();
    let second = b
        .add_record(&ctx, b"again", [AddOption::Thread(thread.clone())])
        .unwrap();

    for record in [&first, &second] {
        a.put_record(
            &ctx,
            record.value().clone(),
            [PutOption::Thread(thread.clone()), PutOption::Log(b.log_id())],
        )
        .unwrap();
    }

    let logs = a.logs(&thread).unwrap();
    assert_eq!(logs.len(), 2);
    let b_log = logs.iter().find(|l| l.id == b.log_id()).unwrap();
    assert_eq!(b_log.head, Some(second.cid()));
    assert!(!b_log.is_owned());

    let delivered = sub.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(delivered.cid(), first.cid());
    assert_eq!(delivered.log_id(), b.log_id());
    let delivered = sub.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(delivered.cid(), second.cid());
}

#[test]
fn test_subscription_follows_thread_filter() {
    let svc = test_service();
    let ctx = Context::background();
    let watched = new_thread();
    let other = new_thread();

    let filtered = svc.subscribe([ListenOption::Thread(watched.clone())]);
    let everything = svc.subscribe([]);

    let in_watched = svc
        .add_record(&ctx, b"a", [AddOption::Thread(watched.clone())])
        .unwrap();
    let in_other = svc
        .add_record(&ctx, b"b", [AddOption::Thread(other.clone())])
        .unwrap();

    assert_eq!(filtered.try_recv().unwrap(), in_watched);
    assert!(filtered.try_recv().is_err());

    assert_eq!(everything.try_recv().unwrap(), in_watched);
    assert_eq!(everything.try_recv().unwrap(), in_other);
}

#[test]
fn test_discard_ends_receiving() {
    let svc = test_service();
    let ctx = Context::background();
    let sub = svc.subscribe([]);

    svc.add_record(&ctx, b"before", []).unwrap();
    sub.discard();
    sub.discard();
    svc.add_record(&ctx, b"after", []).unwrap();

    assert!(sub.recv().is_err());
}

#[test]
fn test_close_ends_all_subscriptions() {
    let svc = test_service();
    let first = svc.subscribe([]);
    let second = svc.subscribe([]);

    svc.close();

    assert!(first.recv().is_err());
    assert!(second.recv().is_err());
}

#[test]
fn test_delete_thread_removes_logs() {
    let svc = test_service();
    let ctx = Context::background();
    let record = svc.add_record(&ctx, b"gone", []).unwrap();
    let thread = record.thread_id().clone();

    svc.delete_thread(&ctx, &thread).unwrap();

    assert!(svc.logs(&thread).unwrap_err().is_not_found());
    assert!(svc
        .get_record(&ctx, &thread, &record.log_id(), &record.cid())
        .unwrap_err()
        .is_not_found());
    assert!(svc.threads().unwrap().is_empty());

    // Blocks are kept
    assert!(svc.dag().has(&record.cid()));
}

#[test]
fn test_add_log_addrs_merges() {
    let svc = test_service();
    let ctx = Context::background();
    let record = svc.add_record(&ctx, b"x", []).unwrap();
    let thread = record.thread_id().clone();
    let addr = "/mem/elsewhere".parse().unwrap();

    svc.add_log_addrs(&thread, &svc.log_id(), &[addr]).unwrap();
    svc.add_log_addrs(&thread, &svc.log_id(), &["/mem/elsewhere".parse().unwrap()])
        .unwrap();

    let logs = svc.logs(&thread).unwrap();
    assert_eq!(logs[0].addrs.len(), 1);
}

#[test]
fn test_thread_addr_roundtrip() {
    let svc = Threadservice::in_memory(
        ServiceConfig {
            listen_addrs: vec!["/mem/self".parse().unwrap()],
            ..Default::default()
        },
        Identity::generate(),
        Arc::new(MemoryHost::new()),
    )
    .unwrap();
    let ctx = Context::background();
    let record = svc.add_record(&ctx, b"x", []).unwrap();

    let addr = svc.thread_addr(record.thread_id()).unwrap();
    assert_eq!(addr.thread, *record.thread_id());
    assert_eq!(addr.log, svc.log_id());
    assert_eq!(addr.to_string().parse::<threadservice::ThreadAddr>().unwrap(), addr);
}

// --- Persistence Tests ---

fn persistent_config(dir: &TempDir) -> ServiceConfig {
    ServiceConfig {
        data_dir: Some(dir.path().join("peer")),
        block_cache_size: 16,
        ..Default::default()
    }
}

#[test]
fn test_reopen_after_writes() {
    let dir = TempDir::new().unwrap();
    let ctx = Context::background();
    let thread = new_thread();

    let (log, head) = {
        let svc = Threadservice::open(persistent_config(&dir), Arc::new(MemoryHost::new())).unwrap();
        let mut last = None;
        for i in 0..5 {
            last = Some(
                svc.add_record(
                    &ctx,
                    format!("entry {i}").as_bytes(),
                    [AddOption::Thread(thread.clone())],
                )
                .unwrap(),
            );
        }
        (svc.log_id(), last.unwrap().cid())
    };

    let svc = Threadservice::open(persistent_config(&dir), Arc::new(MemoryHost::new())).unwrap();
    assert_eq!(svc.log_id(), log);
    assert_eq!(svc.logs(&thread).unwrap()[0].head, Some(head));

    let page = svc.pull(&ctx, &thread, &log, None, []).unwrap();
    assert_eq!(page.len(), 5);
    assert_eq!(svc.open_record(&page[4], None).unwrap(), b"entry 4");

    // Chain continues from the persisted head
    let next = svc
        .add_record(&ctx, b"entry 5", [AddOption::Thread(thread.clone())])
        .unwrap();
    assert_eq!(next.value().prev, Some(head));
}

#[test]
fn test_pull_thread_checks_owned_logs() {
    let svc = test_service();
    let ctx = Context::background();
    let thread = new_thread();

    for _ in 0..3 {
        svc.add_record(&ctx, b"x", [AddOption::Thread(thread.clone())])
            .unwrap();
    }

    let summary = svc.pull_thread(&ctx, &thread).unwrap();
    assert_eq!(summary.synced, vec![svc.log_id()]);
    assert_eq!(summary.records, 0);
}

#[test]
fn test_service_emits_logs() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let svc = test_service();
    let ctx = Context::background();
    let record = svc.add_record(&ctx, b"traced", []).unwrap();
    svc.delete_thread(&ctx, record.thread_id()).unwrap();
}
