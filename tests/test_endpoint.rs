// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Socket endpoint: framed handshake ordering, connect failure, stale
// socket handling and malformed peers.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use cbreg::frame::{self, FrameError, DEFAULT_MAX_PAYLOAD};
use cbreg::{CallbackIdentity, CancelToken, EndpointClient, EndpointListener, Error};

const IO_TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

fn socket_path(dir: &tempfile::TempDir, tag: &str) -> PathBuf {
    dir.path().join(format!("{tag}.sock"))
}

fn id(s: &str) -> CallbackIdentity {
    CallbackIdentity::new(s).unwrap()
}

#[test]
fn connect_without_listener_is_acquisition_error() {
    let dir = tempfile::tempdir().unwrap();
    let client = EndpointClient::new(socket_path(&dir, "nobody"));
    let err = client.register(&id("cb")).unwrap_err();
    assert!(matches!(err, Error::ChannelAcquisition { op: "connect endpoint", .. }));
}

#[test]
fn registration_then_acknowledgement() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "handshake");
    let listener = EndpointListener::bind(&path, DEFAULT_MAX_PAYLOAD, IO_TIMEOUT).unwrap();

    let client_path = path.clone();
    let client = thread::spawn(move || {
        EndpointClient::new(&client_path)
            .with_limits(DEFAULT_MAX_PAYLOAD, IO_TIMEOUT)
            .register(&CallbackIdentity::new("my_callback_function").unwrap())
    });

    let mut conn = listener.accept(&CancelToken::new(), Some(Duration::from_secs(10))).unwrap();
    let got = conn.read_registration().unwrap();
    assert_eq!(got, id("my_callback_function"));
    conn.acknowledge("invoked my_callback_function").unwrap();

    assert_eq!(client.join().unwrap().unwrap(), "invoked my_callback_function");
}

#[test]
fn early_write_is_delivered_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "early");
    let listener = EndpointListener::bind(&path, DEFAULT_MAX_PAYLOAD, IO_TIMEOUT).unwrap();

    let name = "n".repeat(200);
    let mut raw = UnixStream::connect(&path).unwrap();
    // Written in two pieces, before the invoker has even accepted.
    let mut framed = Vec::new();
    frame::write_frame(&mut framed, name.as_bytes(), DEFAULT_MAX_PAYLOAD).unwrap();
    raw.write_all(&framed[..10]).unwrap();
    raw.write_all(&framed[10..]).unwrap();

    let mut conn = listener.accept(&CancelToken::new(), Some(Duration::from_secs(10))).unwrap();
    assert_eq!(conn.read_registration().unwrap().as_str(), name);
    conn.acknowledge("ok").unwrap();

    raw.set_read_timeout(IO_TIMEOUT).unwrap();
    assert_eq!(frame::read_frame(&mut raw, DEFAULT_MAX_PAYLOAD).unwrap(), b"ok");
}

#[test]
fn no_acknowledgement_before_full_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "partial");
    let listener = EndpointListener::bind(&path, DEFAULT_MAX_PAYLOAD, IO_TIMEOUT).unwrap();

    let mut framed = Vec::new();
    frame::write_frame(&mut framed, b"slow_callback", DEFAULT_MAX_PAYLOAD).unwrap();
    let (head, tail) = framed.split_at(8);
    let (head, tail) = (head.to_vec(), tail.to_vec());

    let client_path = path.clone();
    let client = thread::spawn(move || {
        let mut s = UnixStream::connect(&client_path).unwrap();
        s.write_all(&head).unwrap();
        // Nothing may arrive while the registration is incomplete.
        s.set_read_timeout(Some(Duration::from_millis(150))).unwrap();
        let mut probe = [0u8; 1];
        let early = s.read(&mut probe);
        assert!(early.is_err(), "acknowledgement arrived before the full message");

        s.write_all(&tail).unwrap();
        s.set_read_timeout(IO_TIMEOUT).unwrap();
        frame::read_frame(&mut s, DEFAULT_MAX_PAYLOAD).unwrap()
    });

    let mut conn = listener.accept(&CancelToken::new(), Some(Duration::from_secs(10))).unwrap();
    let got = conn.read_registration().unwrap();
    assert_eq!(got, id("slow_callback"));
    conn.acknowledge("done").unwrap();
    assert_eq!(client.join().unwrap(), b"done");
}

#[test]
fn oversize_registration_is_transport_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "oversize");
    let listener = EndpointListener::bind(&path, 32, IO_TIMEOUT).unwrap();

    let mut raw = UnixStream::connect(&path).unwrap();
    frame::write_frame(&mut raw, &[b'q'; 64], 1024).unwrap();

    let mut conn = listener.accept(&CancelToken::new(), Some(Duration::from_secs(10))).unwrap();
    let err = conn.read_registration().unwrap_err();
    assert!(matches!(
        err,
        Error::TransportIo { source: FrameError::TooLarge { len: 64, max: 32 }, .. }
    ));
}

#[test]
fn peer_hangup_is_transport_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "hangup");
    let listener = EndpointListener::bind(&path, DEFAULT_MAX_PAYLOAD, IO_TIMEOUT).unwrap();

    drop(UnixStream::connect(&path).unwrap());

    let mut conn = listener.accept(&CancelToken::new(), Some(Duration::from_secs(10))).unwrap();
    assert!(matches!(
        conn.read_registration(),
        Err(Error::TransportIo { source: FrameError::Closed, .. })
    ));
}

#[test]
fn accept_times_out_and_cancels() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "idle");
    let listener = EndpointListener::bind(&path, DEFAULT_MAX_PAYLOAD, IO_TIMEOUT).unwrap();

    let err = listener
        .accept(&CancelToken::new(), Some(Duration::from_millis(80)))
        .err()
        .unwrap();
    assert!(matches!(err, Error::TimedOut));

    let cancel = CancelToken::new();
    let c2 = cancel.clone();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        c2.cancel();
    });
    let start = Instant::now();
    assert!(matches!(listener.accept(&cancel, None), Err(Error::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(10));
    stopper.join().unwrap();
}

#[test]
fn stale_socket_replaced_and_removed_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "stale");

    // Leave a socket file behind with nobody listening.
    {
        let l = std::os::unix::net::UnixListener::bind(&path).unwrap();
        drop(l);
    }
    assert!(path.exists());

    let listener = EndpointListener::bind(&path, DEFAULT_MAX_PAYLOAD, IO_TIMEOUT).unwrap();
    assert_eq!(listener.path(), path.as_path());
    drop(listener);
    assert!(!path.exists());
}

#[test]
fn refuses_to_clobber_live_listener_or_regular_file() {
    let dir = tempfile::tempdir().unwrap();

    let live = socket_path(&dir, "live");
    let _first = EndpointListener::bind(&live, DEFAULT_MAX_PAYLOAD, IO_TIMEOUT).unwrap();
    assert!(matches!(
        EndpointListener::bind(&live, DEFAULT_MAX_PAYLOAD, IO_TIMEOUT),
        Err(Error::ChannelAcquisition { op: "bind endpoint", .. })
    ));

    let file = dir.path().join("not_a_socket");
    std::fs::write(&file, b"keep").unwrap();
    assert!(EndpointListener::bind(&file, DEFAULT_MAX_PAYLOAD, IO_TIMEOUT).is_err());
    assert_eq!(std::fs::read(&file).unwrap(), b"keep");
}
