//! Behavioural tests for the dispatch loop behind a real socket.
#![cfg(unix)]

use std::cell::RefCell;
use std::thread;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use crate::dispatch::{CancellationToken, CommandRegistry, Dispatcher, LoopExit, marker_value};
use crate::transport::SocketRequestSource;

use super::support::{SocketClient, TestConfigLoader, wait_until};

struct SocketWorld {
    loader: TestConfigLoader,
    loop_thread: Option<thread::JoinHandle<LoopExit>>,
    client: Option<SocketClient>,
    responses: Vec<Value>,
}

impl SocketWorld {
    fn new() -> Self {
        Self {
            loader: TestConfigLoader::new(),
            loop_thread: None,
            client: None,
            responses: Vec::new(),
        }
    }

    fn start(&mut self) {
        let mut source = SocketRequestSource::bind(&self.loader.endpoint()).expect("bind socket");
        self.loop_thread = Some(thread::spawn(move || {
            Dispatcher::new(CommandRegistry::standard())
                .run(&mut source, &CancellationToken::new())
        }));
        self.client = Some(SocketClient::connect(&self.loader.socket_path()));
    }

    fn client(&mut self) -> &mut SocketClient {
        self.client.as_mut().expect("client connected")
    }

    fn exchange(&mut self, request: &Value) {
        self.client().send(request);
        let response = self.client().receive();
        self.responses.push(response);
    }
}

#[fixture]
fn world() -> RefCell<SocketWorld> {
    RefCell::new(SocketWorld::new())
}

#[given("the dispatch loop is serving a Unix socket")]
fn given_serving(world: &RefCell<SocketWorld>) {
    world.borrow_mut().start();
}

#[when("a client sends a markFields request over the socket")]
fn when_mark_fields(world: &RefCell<SocketWorld>) {
    world.borrow_mut().exchange(&json!({
        "commandName": "markFields",
        "arguments": {
            "data": [{"encryptMe": "4111-1111", "name": "Ada"}, {"name": "Grace"}],
            "schema": {"properties": {}},
        },
    }));
}

#[when("the client sends a line that is not JSON")]
fn when_malformed(world: &RefCell<SocketWorld>) {
    let mut world = world.borrow_mut();
    world.client().send_raw("{not json\n");
    let response = world.client().receive();
    world.responses.push(response);
}

#[when("the client sends a shutdown request")]
fn when_shutdown(world: &RefCell<SocketWorld>) {
    world
        .borrow_mut()
        .client()
        .send(&json!({"commandName": "shutdown"}));
}

#[then("the client receives the marked documents")]
fn then_marked(world: &RefCell<SocketWorld>) {
    let world = world.borrow();
    let response = world.responses.first().expect("markFields answered");
    assert_eq!(
        response,
        &json!({
            "ok": true,
            "payload": {
                "data": [
                    {"encryptMe": marker_value(), "name": "Ada"},
                    {"name": "Grace"},
                ],
            },
        })
    );
}

#[then("the client receives a malformed request error")]
fn then_malformed(world: &RefCell<SocketWorld>) {
    let world = world.borrow();
    let response = world.responses.get(1).expect("malformed line answered");
    assert_eq!(response.get("ok"), Some(&json!(false)));
    let message = response
        .get("errorMessage")
        .and_then(Value::as_str)
        .expect("error message");
    assert!(message.starts_with("malformed request"), "{message}");
}

#[then("the loop stops on the shutdown command")]
fn then_loop_stops(world: &RefCell<SocketWorld>) {
    let handle = world
        .borrow_mut()
        .loop_thread
        .take()
        .expect("loop running");
    let exit = handle.join().expect("loop thread");
    assert_eq!(exit, LoopExit::ShutdownCommand);
}

#[then("the socket file is removed")]
fn then_socket_removed(world: &RefCell<SocketWorld>) {
    let path = world.borrow().loader.socket_path();
    assert!(wait_until(|| !path.exists()), "socket file should be removed");
}

#[scenario(path = "tests/features/daemon_socket.feature")]
fn daemon_socket(#[from(world)] world: RefCell<SocketWorld>) {
    drop(world);
}
