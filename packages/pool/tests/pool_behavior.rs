//! Pool-level behavior: protocol racing, idle-socket reuse, ceilings,
//! failure fan-out, group lifecycle.

mod common;

use std::rc::Rc;

use streampool::{
    AttemptOutcome, CertStatus, Certificate, NetError, NextProto, PoolConfig, QuicVersion,
    RequestPriority, SessionConfig, SslCertRequestInfo, SslInfo,
};

use common::{failed, harness, harness_with, key, ready, FakeSocket, RecordingDelegate};

fn no_quic() -> SessionConfig {
    SessionConfig {
        enable_quic: false,
        ..SessionConfig::default()
    }
}

fn tiny_pool() -> SessionConfig {
    SessionConfig {
        enable_quic: false,
        pool: PoolConfig {
            max_streams_per_pool: 1,
            max_streams_per_group: 1,
        },
    }
}

#[test]
fn quic_races_tcp_and_the_winner_cancels_the_loser() {
    let h = harness();
    let delegate = RecordingDelegate::new();
    // TCP hangs; QUIC completes.
    h.connector.push_quic_outcome(ready(NextProto::Http3));
    let job = h.pool.create_job(
        delegate.clone(),
        key("https://example.com/"),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job.start();
    assert_eq!(h.connector.tcp_started.borrow().len(), 1);
    assert_eq!(h.connector.quic_started.borrow().len(), 1);

    h.runner.run_until_idle();
    assert_eq!(delegate.ready.borrow().as_slice(), &[(job.id(), NextProto::Http3)]);
    let tcp_id = h.connector.tcp_started.borrow()[0].0;
    assert!(h.connector.cancelled.borrow().contains(&tcp_id));
}

#[test]
fn a_cancelled_attempts_late_completion_is_ignored() {
    let h = harness();
    let delegate = RecordingDelegate::new();
    // Both attempts complete; TCP's completion runs first and wins.
    h.connector.push_tcp_outcome(ready(NextProto::Http2));
    h.connector.push_quic_outcome(ready(NextProto::Http3));
    let job = h.pool.create_job(
        delegate.clone(),
        key("https://example.com/"),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job.start();
    h.runner.run_until_idle();

    // The QUIC attempt was cancelled, yet its completion still arrived.
    let quic_id = h.connector.quic_started.borrow()[0].0;
    assert!(h.connector.cancelled.borrow().contains(&quic_id));
    // The late completion produced no second callback and no pooled
    // socket.
    assert_eq!(delegate.ready.borrow().as_slice(), &[(job.id(), NextProto::Http2)]);
    assert_eq!(delegate.callback_count(), 1);
    assert_eq!(h.pool.idle_socket_count(), 0);
}

#[test]
fn quic_is_not_attempted_for_plain_http() {
    let h = harness();
    let delegate = RecordingDelegate::new();
    let job = h.pool.create_job(
        delegate,
        key("http://example.com/"),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job.start();
    assert_eq!(h.connector.tcp_started.borrow().len(), 1);
    assert!(h.connector.quic_started.borrow().is_empty());
}

#[test]
fn requested_quic_version_forces_a_quic_attempt() {
    let h = harness_with(no_quic());
    let delegate = RecordingDelegate::new();
    let job = h.pool.create_job(
        delegate,
        key("https://example.com/"),
        RequestPriority::default(),
        QuicVersion::V1,
        None,
    );
    job.start();
    let quic = h.connector.quic_started.borrow();
    assert_eq!(quic.len(), 1);
    assert_eq!(quic[0].1, QuicVersion::V1);
}

#[test]
fn multiplexed_winner_serves_every_waiting_job() {
    let h = harness_with(no_quic());
    let delegate = RecordingDelegate::new();
    h.connector.push_tcp_outcome(ready(NextProto::Http2));
    let destination = key("https://example.com/");

    let job1 = h.pool.create_job(
        delegate.clone(),
        destination.clone(),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job1.start();
    let job2 = h.pool.create_job(
        delegate.clone(),
        destination,
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job2.start();

    // The second job joined the in-flight attempt instead of starting
    // its own.
    assert_eq!(h.connector.tcp_started.borrow().len(), 1);

    h.runner.run_until_idle();
    let mut served: Vec<_> = delegate.ready.borrow().clone();
    served.sort_unstable_by_key(|(id, _)| *id);
    assert_eq!(served, vec![(job1.id(), NextProto::Http2), (job2.id(), NextProto::Http2)]);
}

#[test]
fn http11_winner_goes_to_the_highest_priority_job_and_attempts_continue() {
    let h = harness_with(no_quic());
    let delegate = RecordingDelegate::new();
    h.connector.push_tcp_outcome(ready(NextProto::Http11));
    h.connector.push_tcp_outcome(ready(NextProto::Http11));
    let destination = key("https://example.com/");

    let job1 = h.pool.create_job(
        delegate.clone(),
        destination.clone(),
        RequestPriority::Low,
        QuicVersion::Unspecified,
        None,
    );
    job1.start();
    let job2 = h.pool.create_job(
        delegate.clone(),
        destination,
        RequestPriority::Highest,
        QuicVersion::Unspecified,
        None,
    );
    job2.start();

    h.runner.run_until_idle();
    // Higher priority wins the first socket; a fresh attempt serves the
    // remaining job.
    assert_eq!(
        delegate.ready.borrow().as_slice(),
        &[(job2.id(), NextProto::Http11), (job1.id(), NextProto::Http11)]
    );
    assert_eq!(h.connector.tcp_started.borrow().len(), 2);
}

#[test]
fn exhausted_attempts_fan_failure_out_to_every_job() {
    let h = harness_with(no_quic());
    let delegate = RecordingDelegate::new();
    h.connector.push_tcp_outcome(failed(NetError::ConnectionRefused));
    let destination = key("https://example.com/");

    let job1 = h.pool.create_job(
        delegate.clone(),
        destination.clone(),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job1.start();
    let job2 = h.pool.create_job(
        delegate.clone(),
        destination.clone(),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job2.start();

    h.runner.run_until_idle();
    let mut failures: Vec<_> = delegate.failed.borrow().clone();
    failures.sort_unstable_by_key(|(id, _)| *id);
    assert_eq!(
        failures,
        vec![
            (job1.id(), NetError::ConnectionRefused),
            (job2.id(), NetError::ConnectionRefused)
        ]
    );

    // A later job gets a fresh attempt manager, not the failed one.
    let job3 = h.pool.create_job(
        delegate.clone(),
        destination,
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job3.start();
    assert_eq!(h.connector.tcp_started.borrow().len(), 2);
    assert!(delegate.failed.borrow().len() == 2);
}

#[test]
fn certificate_errors_fan_out_as_their_own_callback() {
    let h = harness_with(no_quic());
    let delegate = RecordingDelegate::new();
    let mut cert_status = CertStatus::default();
    cert_status.insert(CertStatus::AUTHORITY_INVALID);
    h.connector.push_tcp_outcome(AttemptOutcome::CertificateError {
        error: NetError::CertAuthorityInvalid,
        ssl_info: SslInfo {
            cert: Some(Certificate::new("CN=example.com", vec![0x30])),
            cert_status,
            is_fatal_cert_error: false,
        },
    });
    let job = h.pool.create_job(
        delegate.clone(),
        key("https://example.com/"),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job.start();
    h.runner.run_until_idle();
    assert_eq!(
        delegate.cert_errors.borrow().as_slice(),
        &[(job.id(), NetError::CertAuthorityInvalid)]
    );
    assert!(delegate.failed.borrow().is_empty());
}

#[test]
fn client_auth_requests_fan_out_as_their_own_callback() {
    let h = harness_with(no_quic());
    let delegate = RecordingDelegate::new();
    h.connector.push_tcp_outcome(AttemptOutcome::NeedsClientAuth {
        cert_request_info: Rc::new(SslCertRequestInfo {
            host_and_port: "example.com:443".into(),
            cert_authorities: Vec::new(),
            is_proxy: false,
        }),
    });
    let job = h.pool.create_job(
        delegate.clone(),
        key("https://example.com/"),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job.start();
    h.runner.run_until_idle();
    assert_eq!(
        delegate.client_auth.borrow().as_slice(),
        &[(job.id(), "example.com:443".to_string())]
    );
    assert!(delegate.failed.borrow().is_empty());
    assert!(delegate.ready.borrow().is_empty());
}

#[test]
fn idle_sockets_are_reused_before_new_attempts() {
    let h = harness_with(no_quic());
    let delegate = RecordingDelegate::new();
    let destination = key("https://example.com/");
    h.pool
        .release_socket(&destination, FakeSocket::connected(), NextProto::Http2);
    assert_eq!(h.pool.idle_socket_count(), 1);

    let job = h.pool.create_job(
        delegate.clone(),
        destination,
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job.start();
    // Reuse is delivered through the sequence, never inline.
    assert!(delegate.ready.borrow().is_empty());
    h.runner.run_until_idle();

    assert_eq!(delegate.ready.borrow().as_slice(), &[(job.id(), NextProto::Http2)]);
    assert!(h.connector.tcp_started.borrow().is_empty());
    assert_eq!(h.pool.idle_socket_count(), 0);
}

#[test]
fn stale_idle_sockets_are_discarded_not_reused() {
    let h = harness_with(no_quic());
    let delegate = RecordingDelegate::new();
    let destination = key("https://example.com/");
    let socket = FakeSocket::connected();
    h.pool
        .release_socket(&destination, socket.clone(), NextProto::Http2);
    socket.close();

    let job = h.pool.create_job(
        delegate.clone(),
        destination,
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job.start();
    h.runner.run_until_idle();

    // The dead socket was dropped and a real attempt started instead.
    assert!(delegate.ready.borrow().is_empty());
    assert_eq!(h.connector.tcp_started.borrow().len(), 1);
    assert_eq!(h.pool.idle_socket_count(), 0);
}

#[test]
fn pool_wide_ceiling_queues_jobs_across_groups() {
    let h = harness_with(tiny_pool());
    let delegate = RecordingDelegate::new();

    let job1 = h.pool.create_job(
        delegate.clone(),
        key("https://one.example/"),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job1.start();
    let job2 = h.pool.create_job(
        delegate.clone(),
        key("https://two.example/"),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job2.start();

    assert_eq!(h.connector.tcp_started.borrow().len(), 1);

    drop(job1);
    h.runner.run_until_idle();
    assert_eq!(h.connector.tcp_started.borrow().len(), 2);
}

#[test]
fn admission_evicts_an_idle_socket_rather_than_refusing() {
    let h = harness_with(tiny_pool());
    let delegate = RecordingDelegate::new();
    h.pool.release_socket(
        &key("https://one.example/"),
        FakeSocket::connected(),
        NextProto::Http2,
    );
    assert_eq!(h.pool.idle_socket_count(), 1);

    // The whole pool is at its ceiling; admitting a job for another
    // destination closes the idle socket.
    let job = h.pool.create_job(
        delegate,
        key("https://two.example/"),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job.start();
    assert_eq!(h.pool.idle_socket_count(), 0);
    assert_eq!(h.connector.tcp_started.borrow().len(), 1);
}

#[test]
fn pending_jobs_resume_in_priority_order() {
    let h = harness_with(SessionConfig {
        enable_quic: false,
        pool: PoolConfig {
            max_streams_per_pool: 1,
            max_streams_per_group: 1,
        },
    });
    let delegate = RecordingDelegate::new();
    let destination = key("https://example.com/");

    let job1 = h.pool.create_job(
        delegate.clone(),
        destination.clone(),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job1.start();
    let low = h.pool.create_job(
        delegate.clone(),
        destination.clone(),
        RequestPriority::Lowest,
        QuicVersion::Unspecified,
        None,
    );
    low.start();
    let high = h.pool.create_job(
        delegate.clone(),
        destination,
        RequestPriority::Highest,
        QuicVersion::Unspecified,
        None,
    );
    high.start();

    drop(job1);
    h.runner.run_until_idle();

    // Only one slot: the high-priority job resumed first.
    assert_eq!(h.connector.tcp_started.borrow().len(), 2);
    assert_eq!(h.pool.active_stream_count(), 1);
    drop(high);
    h.runner.run_until_idle();
    assert_eq!(h.connector.tcp_started.borrow().len(), 3);
}

#[test]
fn unused_groups_are_removed_from_the_registry() {
    let h = harness_with(no_quic());
    let delegate = RecordingDelegate::new();
    h.connector.push_tcp_outcome(failed(NetError::ConnectionTimedOut));
    let job = h.pool.create_job(
        delegate.clone(),
        key("https://example.com/"),
        RequestPriority::default(),
        QuicVersion::Unspecified,
        None,
    );
    job.start();
    assert_eq!(h.pool.group_count(), 1);
    h.runner.run_until_idle();
    assert_eq!(delegate.failed.borrow().len(), 1);

    drop(job);
    assert_eq!(h.pool.group_count(), 0);
    assert_eq!(h.pool.active_stream_count(), 0);
}
