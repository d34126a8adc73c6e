// MIT License - Copyright (c) 2026 tapper-bridge contributors

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, TapperError};
use crate::status::TapperStatus;
use crate::transport::{CommandParams, CommandResponse, TapperProtocol, TapperTransport};

const PROTOCOL: &str = "CachedFallback";

/// One operation routed through the fallback chain.
enum Request<'a> {
    Command {
        command: &'a str,
        params: Option<&'a CommandParams>,
    },
    Status,
    Extend(u64),
    Retract(u64),
}

impl Request<'_> {
    fn operation(&self) -> &str {
        match self {
            Request::Command { command, .. } => command,
            Request::Status => "status",
            Request::Extend(_) => "extend_for_time",
            Request::Retract(_) => "retract_for_time",
        }
    }
}

enum Outcome {
    Response(CommandResponse),
    Status(TapperStatus),
}

/// Composite transport with automatic failover and a sticky working cache.
///
/// Members are tried in priority order. Once a member succeeds, it becomes
/// the cached working protocol and is tried first for subsequent operations;
/// the cache is cleared only when every member has failed. The cache lock is
/// held across the member call, so concurrent commands against one device are
/// serialized instead of interleaving on the wire.
///
/// Generic over the member type so tests can drive the chain with scripted
/// protocols; production code uses the default `TapperTransport`.
#[derive(Debug)]
pub struct FallbackTapperProtocol<P: TapperProtocol = TapperTransport> {
    device_id: String,
    members: Vec<P>,
    working: Mutex<Option<usize>>,
}

impl<P: TapperProtocol> FallbackTapperProtocol<P> {
    /// Build from members in priority order. Rejects an empty chain.
    pub fn new(device_id: impl Into<String>, members: Vec<P>) -> Result<Self> {
        let device_id = device_id.into();
        if members.is_empty() {
            return Err(TapperError::Config(format!(
                "device '{device_id}': fallback chain has no protocols"
            )));
        }
        Ok(Self {
            device_id,
            members,
            working: Mutex::new(None),
        })
    }

    pub fn members(&self) -> &[P] {
        &self.members
    }

    /// Names of every member in priority order, connected or not.
    pub fn available_protocols(&self) -> Vec<&'static str> {
        self.members.iter().map(|m| m.protocol_name()).collect()
    }

    /// Name of the cached working protocol, if one is set.
    pub async fn working_protocol(&self) -> Option<&'static str> {
        let cached = self.working.lock().await;
        cached.map(|i| self.members[i].protocol_name())
    }

    /// Try the cached working member first, then the rest in priority order.
    fn candidate_order(&self, cached: Option<usize>) -> Vec<usize> {
        let len = self.members.len();
        let mut order = Vec::with_capacity(len);
        if let Some(i) = cached {
            if i < len {
                order.push(i);
            }
        }
        order.extend((0..len).filter(|i| Some(*i) != cached));
        order
    }

    /// Route one operation through the chain.
    ///
    /// Holds the cache lock for the duration of the member call; that lock is
    /// what keeps concurrent tap sequences from interleaving commands.
    async fn dispatch(&self, request: Request<'_>) -> Result<Outcome> {
        let mut cached = self.working.lock().await;
        let operation = request.operation();
        let mut failures: Vec<String> = Vec::new();

        for idx in self.candidate_order(*cached) {
            let member = &self.members[idx];
            let name = member.protocol_name();
            match run(member, &request).await {
                Ok(outcome) => {
                    if *cached != Some(idx) {
                        info!(
                            device_id = %self.device_id,
                            "'{operation}' succeeded via {name}, caching as working protocol"
                        );
                    } else {
                        debug!(device_id = %self.device_id, "'{operation}' via cached {name}");
                    }
                    *cached = Some(idx);
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        device_id = %self.device_id,
                        "{name} failed for '{operation}', trying next protocol: {e}"
                    );
                    failures.push(format!("{name}: {e}"));
                }
                Err(e) => return Err(e),
            }
        }

        *cached = None;
        Err(TapperError::protocol(
            &self.device_id,
            PROTOCOL,
            operation,
            format!("all protocols failed: {}", failures.join("; ")),
        ))
    }
}

async fn run<P: TapperProtocol>(member: &P, request: &Request<'_>) -> Result<Outcome> {
    match *request {
        Request::Command { command, params } => {
            member.send_command(command, params).await.map(Outcome::Response)
        }
        Request::Status => member.get_status().await.map(Outcome::Status),
        Request::Extend(ms) => member.extend_for_time(ms).await.map(Outcome::Response),
        Request::Retract(ms) => member.retract_for_time(ms).await.map(Outcome::Response),
    }
}

impl<P: TapperProtocol> TapperProtocol for FallbackTapperProtocol<P> {
    fn protocol_name(&self) -> &'static str {
        PROTOCOL
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn is_connected(&self) -> bool {
        self.members.iter().any(|m| m.is_connected())
    }

    /// Connect every member that will connect. Succeeds if at least one
    /// member comes up; individual failures are logged, not fatal.
    async fn connect(&mut self) -> Result<()> {
        let mut first_up = None;
        let mut failures: Vec<String> = Vec::new();

        for (idx, member) in self.members.iter_mut().enumerate() {
            let name = member.protocol_name();
            match member.connect().await {
                Ok(()) => {
                    debug!(device_id = %self.device_id, "{name} connected");
                    first_up.get_or_insert(idx);
                }
                Err(e) => {
                    warn!(device_id = %self.device_id, "{name} failed to connect: {e}");
                    failures.push(format!("{name}: {e}"));
                }
            }
        }

        match first_up {
            Some(idx) => {
                *self.working.get_mut() = Some(idx);
                info!(
                    device_id = %self.device_id,
                    "connected, active protocols: {:?}", self.active_protocols()
                );
                Ok(())
            }
            None => Err(TapperError::protocol(
                &self.device_id,
                PROTOCOL,
                "connect",
                format!("no protocol could connect: {}", failures.join("; ")),
            )),
        }
    }

    async fn send_command(
        &self,
        command: &str,
        params: Option<&CommandParams>,
    ) -> Result<CommandResponse> {
        match self.dispatch(Request::Command { command, params }).await? {
            Outcome::Response(response) => Ok(response),
            Outcome::Status(_) => unreachable!("command request produced a status outcome"),
        }
    }

    async fn get_status(&self) -> Result<TapperStatus> {
        match self.dispatch(Request::Status).await? {
            Outcome::Status(status) => Ok(status),
            Outcome::Response(_) => unreachable!("status request produced a command outcome"),
        }
    }

    /// Disconnect all members. Member errors are demoted to warnings so one
    /// bad teardown cannot leave the others dangling.
    async fn disconnect(&mut self) -> Result<()> {
        for member in &mut self.members {
            let name = member.protocol_name();
            if let Err(e) = member.disconnect().await {
                warn!(device_id = %self.device_id, "{name} disconnect error: {e}");
            }
        }
        *self.working.get_mut() = None;
        Ok(())
    }

    async fn extend_for_time(&self, duration_ms: u64) -> Result<CommandResponse> {
        match self.dispatch(Request::Extend(duration_ms)).await? {
            Outcome::Response(response) => Ok(response),
            Outcome::Status(_) => unreachable!("extend request produced a status outcome"),
        }
    }

    async fn retract_for_time(&self, duration_ms: u64) -> Result<CommandResponse> {
        match self.dispatch(Request::Retract(duration_ms)).await? {
            Outcome::Response(response) => Ok(response),
            Outcome::Status(_) => unreachable!("retract request produced a status outcome"),
        }
    }

    fn active_protocols(&self) -> Vec<&'static str> {
        self.members
            .iter()
            .filter(|m| m.is_connected())
            .map(|m| m.protocol_name())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use super::*;

    /// Scripted chain member. Records every call so tests can assert on the
    /// order the chain tried its members in.
    #[derive(Debug)]
    struct MockProtocol {
        name: &'static str,
        connected: AtomicBool,
        fail_connect: bool,
        fail_send: AtomicBool,
        config_error_on_send: bool,
        delay: Duration,
        log: Arc<StdMutex<Vec<String>>>,
    }

    impl MockProtocol {
        fn new(name: &'static str, log: &Arc<StdMutex<Vec<String>>>) -> Self {
            Self {
                name,
                connected: AtomicBool::new(false),
                fail_connect: false,
                fail_send: AtomicBool::new(false),
                config_error_on_send: false,
                delay: Duration::ZERO,
                log: Arc::clone(log),
            }
        }

        fn failing_send(mut self) -> Self {
            self.fail_send = AtomicBool::new(true);
            self
        }

        fn record(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{}:{event}", self.name));
        }
    }

    impl TapperProtocol for MockProtocol {
        fn protocol_name(&self) -> &'static str {
            self.name
        }

        fn device_id(&self) -> &str {
            "mock-device"
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn connect(&mut self) -> Result<()> {
            if self.fail_connect {
                return Err(TapperError::connection("mock-device", self.name, "refused"));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn send_command(
            &self,
            command: &str,
            _params: Option<&CommandParams>,
        ) -> Result<CommandResponse> {
            self.record(&format!("start:{command}"));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.record(&format!("end:{command}"));
            if self.config_error_on_send {
                return Err(TapperError::Config("bad setup".to_string()));
            }
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(TapperError::connection("mock-device", self.name, "down"));
            }
            Ok(CommandResponse::Text("ok".to_string()))
        }

        async fn get_status(&self) -> Result<TapperStatus> {
            self.record("status");
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(TapperError::connection("mock-device", self.name, "down"));
            }
            Ok(TapperStatus::Middle)
        }

        async fn disconnect(&mut self) -> Result<()> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn log() -> Arc<StdMutex<Vec<String>>> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    fn events(log: &Arc<StdMutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_empty_chain_rejected() {
        let err =
            FallbackTapperProtocol::<MockProtocol>::new("station1", Vec::new()).unwrap_err();
        assert!(matches!(err, TapperError::Config(_)));
    }

    #[tokio::test]
    async fn test_failover_to_second_member() {
        let log = log();
        let chain = FallbackTapperProtocol::new(
            "station1",
            vec![
                MockProtocol::new("MQTT", &log).failing_send(),
                MockProtocol::new("HTTP", &log),
            ],
        )
        .unwrap();

        let response = chain.send_command("tap", None).await.unwrap();
        assert_eq!(response, CommandResponse::Text("ok".to_string()));
        assert_eq!(chain.working_protocol().await, Some("HTTP"));
        assert_eq!(
            events(&log),
            vec!["MQTT:start:tap", "MQTT:end:tap", "HTTP:start:tap", "HTTP:end:tap"]
        );
    }

    #[tokio::test]
    async fn test_working_cache_is_sticky() {
        let log = log();
        let chain = FallbackTapperProtocol::new(
            "station1",
            vec![
                MockProtocol::new("MQTT", &log).failing_send(),
                MockProtocol::new("HTTP", &log),
            ],
        )
        .unwrap();

        chain.send_command("tap", None).await.unwrap();
        log.lock().unwrap().clear();

        // Second command goes straight to the cached member, no retry of MQTT
        chain.send_command("reset", None).await.unwrap();
        assert_eq!(events(&log), vec!["HTTP:start:reset", "HTTP:end:reset"]);
    }

    #[tokio::test]
    async fn test_cache_cleared_after_total_failure() {
        let log = log();
        let mqtt = MockProtocol::new("MQTT", &log);
        let http = MockProtocol::new("HTTP", &log).failing_send();
        let chain = FallbackTapperProtocol::new("station1", vec![mqtt, http]).unwrap();

        // Cache MQTT, then break it so both members are down
        chain.send_command("tap", None).await.unwrap();
        assert_eq!(chain.working_protocol().await, Some("MQTT"));

        chain.members()[0].fail_send.store(true, Ordering::SeqCst);
        let err = chain.send_command("tap", None).await.unwrap_err();
        assert!(matches!(err, TapperError::Protocol { .. }));
        let text = err.to_string();
        assert!(text.contains("MQTT"));
        assert!(text.contains("HTTP"));
        assert_eq!(chain.working_protocol().await, None);

        // Recovery restarts from priority order
        chain.members()[0].fail_send.store(false, Ordering::SeqCst);
        chain.send_command("tap", None).await.unwrap();
        assert_eq!(chain.working_protocol().await, Some("MQTT"));
    }

    #[tokio::test]
    async fn test_config_error_short_circuits() {
        let log = log();
        let mut broken = MockProtocol::new("MQTT", &log);
        broken.config_error_on_send = true;
        let chain = FallbackTapperProtocol::new(
            "station1",
            vec![broken, MockProtocol::new("HTTP", &log)],
        )
        .unwrap();

        let err = chain.send_command("tap", None).await.unwrap_err();
        assert!(matches!(err, TapperError::Config(_)));
        // HTTP was never tried
        assert!(!events(&log).iter().any(|e| e.starts_with("HTTP")));
    }

    #[tokio::test]
    async fn test_status_uses_fallback_chain() {
        let log = log();
        let chain = FallbackTapperProtocol::new(
            "station1",
            vec![
                MockProtocol::new("MQTT", &log).failing_send(),
                MockProtocol::new("HTTP", &log),
            ],
        )
        .unwrap();

        let status = chain.get_status().await.unwrap();
        assert_eq!(status, TapperStatus::Middle);
        assert_eq!(chain.working_protocol().await, Some("HTTP"));
    }

    #[tokio::test]
    async fn test_connect_tolerates_partial_failure() {
        let log = log();
        let mut refused = MockProtocol::new("MQTT", &log);
        refused.fail_connect = true;
        let mut chain = FallbackTapperProtocol::new(
            "station1",
            vec![refused, MockProtocol::new("HTTP", &log)],
        )
        .unwrap();

        chain.connect().await.unwrap();
        assert!(chain.is_connected());
        assert_eq!(chain.available_protocols(), vec!["MQTT", "HTTP"]);
        assert_eq!(chain.active_protocols(), vec!["HTTP"]);
        assert_eq!(chain.working_protocol().await, Some("HTTP"));
    }

    #[tokio::test]
    async fn test_connect_fails_when_no_member_connects() {
        let log = log();
        let mut a = MockProtocol::new("MQTT", &log);
        a.fail_connect = true;
        let mut b = MockProtocol::new("HTTP", &log);
        b.fail_connect = true;
        let mut chain = FallbackTapperProtocol::new("station1", vec![a, b]).unwrap();

        let err = chain.connect().await.unwrap_err();
        assert!(matches!(err, TapperError::Protocol { .. }));
        assert!(!chain.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_commands_are_serialized() {
        let log = log();
        let mut slow = MockProtocol::new("HTTP", &log);
        slow.delay = Duration::from_millis(50);
        let chain = FallbackTapperProtocol::new("station1", vec![slow]).unwrap();

        let (a, b) = tokio::join!(
            chain.send_command("tap_card1", None),
            chain.send_command("tap_card2", None)
        );
        a.unwrap();
        b.unwrap();

        // One command fully completes before the other starts
        let events = events(&log);
        assert_eq!(events.len(), 4);
        assert!(events[0].contains("start"));
        assert!(events[1].contains("end"));
        assert!(events[2].contains("start"));
        assert!(events[3].contains("end"));
        assert_eq!(events[0].replace("start", "X"), events[1].replace("end", "X"));
    }
}
