//! One meter reached through its Wirepas NIC
//!
//! A [`Meter`] owns the credentials of one node and up to three DLMS clients:
//!
//! - the passthrough client, created for every request to the meter logical device
//! - the NIC client, alive between [`Meter::establish_aa_nic`] and [`Meter::release_aa_nic`]
//! - the push client, only used to open the notifications the NIC sends
//!
//! Requests are serialized: one APDU is in flight per meter and the calling
//! thread waits until the network interface routes the response back through
//! [`Meter::on_data_received`], or until the response timeout. Unsolicited
//! frames are handed to user callbacks on a dedicated worker thread, in the
//! order they were received.
//!
//! # Key rotation
//!
//! New credentials written to the NIC with
//! [`Meter::set_nic_security_material_with_list`] only take effect on the NIC
//! once the association is released. The slots the NIC accepted are kept aside
//! and merged into the configuration by a successful [`Meter::release_aa_nic`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, mpsc};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::association_level::AssociationLevel;
use crate::client::{DLMS_METER_ADDRESS, DLMS_NIC_ADDRESS, DlmsClient, NIC_CLIENT_SYSTEM_TITLE};
use crate::config::{KeyRotation, MeterConfiguration, MeterOptions};
use crate::error::{ConfigurationError, Error};
use crate::notification::{NicStatusWord, NotificationObis, WirepasNotification};
use crate::response::{ErrorCode, Response};
use crate::security_control::Security;
use crate::session::{Pending, Session, lock};
use crate::transport::{DlmsNetworkInterface, OutboundPacket, Packet};

pub type NicStatusCallback = Arc<dyn Fn(u32, &NicStatusWord) + Send + Sync>;
pub type NotificationCallback = Arc<dyn Fn(u32, &WirepasNotification) + Send + Sync>;
pub type UnparsedCallback = Arc<dyn Fn(u32, &[u8]) + Send + Sync>;

/// User callbacks, called with the node id of the meter.
#[derive(Clone, Default)]
pub struct MeterCallbacks {
    pub nic_status: Option<NicStatusCallback>,
    pub notification: Option<NotificationCallback>,
    pub unparsed: Option<UnparsedCallback>,
}

impl fmt::Debug for MeterCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterCallbacks")
            .field("nic_status", &self.nic_status.is_some())
            .field("notification", &self.notification.is_some())
            .field("unparsed", &self.unparsed.is_some())
            .finish()
    }
}

/// Logical device a request is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// The meter in passthrough, under the given association.
    Meter(AssociationLevel),
    /// The NIC, under the established association.
    Nic,
}

impl Target {
    fn to_nic_server(self) -> bool {
        matches!(self, Target::Nic)
    }
}

type Task = Box<dyn FnOnce() + Send>;

/// Single thread running callbacks in FIFO order. `None` stops it.
struct Worker {
    tasks: mpsc::Sender<Option<Task>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Worker {
    fn spawn(name: String) -> std::io::Result<Self> {
        let (tasks, queue) = mpsc::channel::<Option<Task>>();
        let handle = thread::Builder::new().name(name).spawn(move || {
            while let Ok(Some(task)) = queue.recv() {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!("A meter callback panicked");
                }
            }
        })?;
        Ok(Self { tasks, handle: Mutex::new(Some(handle)) })
    }

    fn execute(&self, task: Task) {
        if self.tasks.send(Some(task)).is_err() {
            warn!("Callback worker is stopped, callback dropped");
        }
    }

    fn terminate(&self) {
        let _ = self.tasks.send(None);
        if let Some(handle) = lock(&self.handle).take() {
            // A callback may terminate its own meter.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Everything a request or a received frame reads or updates.
struct MeterState {
    config: MeterConfiguration,
    response_timeout: Duration,
    increment_invoke_id: bool,
    invocation_counter: u32,
    nic_system_title: Option<[u8; 8]>,
    gateway_id: Option<String>,
    sink_id: Option<String>,
    client: Option<DlmsClient>,
    nic_client: Option<DlmsClient>,
    push_client: DlmsClient,
    pending_rotation: KeyRotation,
    confirmed_rotation: KeyRotation,
}

impl MeterState {
    fn create_client(&self, association: AssociationLevel, to_nic_server: bool) -> DlmsClient {
        let (server_address, system_title) = match (to_nic_server, self.nic_system_title) {
            (true, _) => (DLMS_NIC_ADDRESS, NIC_CLIENT_SYSTEM_TITLE),
            // No association in passthrough: the meter expects the NIC system title.
            (false, Some(title)) => (DLMS_METER_ADDRESS, title),
            (false, None) => (DLMS_METER_ADDRESS, NIC_CLIENT_SYSTEM_TITLE),
        };
        let mut client = DlmsClient::new(association, server_address, &self.config, system_title);
        if let Some(title) = self.nic_system_title {
            client.set_server_system_title(title);
        }
        client.set_invocation_counter(self.invocation_counter);
        client
    }

    fn client(&self, to_nic_server: bool) -> Option<&DlmsClient> {
        if to_nic_server { self.nic_client.as_ref() } else { self.client.as_ref() }
    }

    fn clients_mut(&mut self) -> impl Iterator<Item = &mut DlmsClient> {
        [self.client.as_mut(), self.nic_client.as_mut(), Some(&mut self.push_client)]
            .into_iter()
            .flatten()
    }

    fn set_invocation_counter(&mut self, invocation_counter: u32) {
        self.invocation_counter = invocation_counter;
        for client in self.clients_mut() {
            client.set_invocation_counter(invocation_counter);
        }
    }

    fn set_nic_system_title(&mut self, system_title: [u8; 8]) {
        self.nic_system_title = Some(system_title);
        for client in self.clients_mut() {
            client.set_server_system_title(system_title);
        }
    }

    fn set_configuration(&mut self, config: MeterConfiguration) {
        self.config = config;
        let config = self.config.clone();
        for client in self.clients_mut() {
            client.set_keys(&config);
        }
    }
}

/// A meter and the NIC it is reached through.
pub struct Meter {
    node_id: u32,
    interface: Arc<dyn DlmsNetworkInterface>,
    session: Session,
    state: Mutex<MeterState>,
    callbacks: RwLock<MeterCallbacks>,
    next_message: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    worker: Worker,
}

impl Meter {
    /// A meter behind the NIC of `node_id`, sending through `interface`.
    ///
    /// The interface must route every frame received from the node to
    /// [`Meter::on_data_received`].
    pub fn new(
        interface: Arc<dyn DlmsNetworkInterface>,
        node_id: u32,
        config: MeterConfiguration,
        options: MeterOptions,
    ) -> Result<Self, Error> {
        let mut push_client = DlmsClient::new(
            AssociationLevel::Push,
            DLMS_NIC_ADDRESS,
            &config,
            NIC_CLIENT_SYSTEM_TITLE,
        );
        if let Some(title) = options.nic_system_title {
            push_client.set_server_system_title(title);
        }

        let state = MeterState {
            config,
            response_timeout: options.response_timeout,
            increment_invoke_id: options.increment_invoke_id,
            invocation_counter: options.invocation_counter,
            nic_system_title: options.nic_system_title,
            gateway_id: None,
            sink_id: None,
            client: None,
            nic_client: None,
            push_client,
            pending_rotation: KeyRotation::new(),
            confirmed_rotation: KeyRotation::new(),
        };

        Ok(Self {
            node_id,
            interface,
            session: Session::default(),
            state: Mutex::new(state),
            callbacks: RwLock::new(MeterCallbacks::default()),
            next_message: Mutex::new(None),
            worker: Worker::spawn(format!("meter-{node_id:X}"))?,
        })
    }

    fn state(&self) -> MutexGuard<'_, MeterState> {
        lock(&self.state)
    }

    fn callbacks(&self) -> MeterCallbacks {
        self.callbacks.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    fn update_callbacks(&self, update: impl FnOnce(&mut MeterCallbacks)) {
        let mut callbacks =
            self.callbacks.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        update(&mut callbacks);
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Copy of the credentials in use.
    pub fn configuration(&self) -> MeterConfiguration {
        self.state().config.clone()
    }

    pub fn nic_system_title(&self) -> Option<[u8; 8]> {
        self.state().nic_system_title
    }

    /// Invocation counter of the last secured request, shared by every client.
    pub fn invocation_counter(&self) -> u32 {
        self.state().invocation_counter
    }

    /// Number of requests sent. Waits for the request in flight, if any.
    pub fn message_count(&self) -> u64 {
        self.session.message_count()
    }

    pub fn response_timeout(&self) -> Duration {
        self.state().response_timeout
    }

    /// Association established with the NIC, if any.
    pub fn nic_association(&self) -> Option<AssociationLevel> {
        self.state().nic_client.as_ref().map(DlmsClient::association)
    }

    pub fn is_waiting_for_response(&self) -> bool {
        self.session.pending().is_some()
    }

    /// Credentials accepted by the NIC, applied at the next release.
    pub fn confirmed_key_rotation(&self) -> KeyRotation {
        self.state().confirmed_rotation.clone()
    }

    pub fn set_nic_status_callback(
        &self,
        callback: impl Fn(u32, &NicStatusWord) + Send + Sync + 'static,
    ) {
        self.update_callbacks(|callbacks| callbacks.nic_status = Some(Arc::new(callback)));
    }

    pub fn set_notification_callback(
        &self,
        callback: impl Fn(u32, &WirepasNotification) + Send + Sync + 'static,
    ) {
        self.update_callbacks(|callbacks| callbacks.notification = Some(Arc::new(callback)));
    }

    pub fn set_unparsed_callback(&self, callback: impl Fn(u32, &[u8]) + Send + Sync + 'static) {
        self.update_callbacks(|callbacks| callbacks.unparsed = Some(Arc::new(callback)));
    }

    /// Replace the credentials, the callbacks and the response timeout that are given.
    pub fn update_meter(
        &self,
        config: Option<MeterConfiguration>,
        callbacks: MeterCallbacks,
        response_timeout: Option<Duration>,
    ) {
        {
            let mut state = self.state();
            if let Some(config) = config {
                state.set_configuration(config);
            }
            if let Some(timeout) = response_timeout {
                state.response_timeout = timeout;
            }
        }
        self.update_callbacks(|current| {
            if let Some(callback) = callbacks.nic_status {
                current.nic_status = Some(callback);
            }
            if let Some(callback) = callbacks.notification {
                current.notification = Some(callback);
            }
            if let Some(callback) = callbacks.unparsed {
                current.unparsed = Some(callback);
            }
        });
    }

    pub fn update_network_settings(
        &self,
        gateway_id: impl Into<String>,
        sink_id: impl Into<String>,
    ) {
        let mut state = self.state();
        state.gateway_id = Some(gateway_id.into());
        state.sink_id = Some(sink_id.into());
    }

    /// `(gateway id, sink id)` the node was last seen on.
    pub fn network_settings(&self) -> (Option<String>, Option<String>) {
        let state = self.state();
        (state.gateway_id.clone(), state.sink_id.clone())
    }

    /// Use the message count as invoke-id. When disabled every request carries
    /// invoke-id 1 and responses are only matched by arrival order, which is
    /// unsafe for bulk requests with timeouts.
    pub fn set_increment_invoke_id(&self, increment: bool) {
        self.state().increment_invoke_id = increment;
    }

    /// System title of the NIC from a 3 character manufacturer flag and the low
    /// 5 bytes of the node id, e.g. `TBC` for node `0x01020304` gives
    /// `TBC\x00\x01\x02\x03\x04`.
    pub fn set_nic_system_title_from_flag(&self, flag: &str) -> Result<(), ConfigurationError> {
        if flag.len() != 3 || !flag.is_ascii() {
            return Err(ConfigurationError::SystemTitleFlag(flag.to_string()));
        }
        let mut title = [0u8; 8];
        title[..3].copy_from_slice(flag.as_bytes());
        title[3..].copy_from_slice(&u64::from(self.node_id).to_be_bytes()[3..]);
        self.state().set_nic_system_title(title);
        Ok(())
    }

    /// Stop the callback worker. Callbacks already queued still run.
    pub fn terminate(&self) {
        self.worker.terminate();
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    pub(crate) fn request(
        &self,
        target: Target,
        build: impl FnOnce(&mut DlmsClient) -> Result<Vec<u8>, Error>,
    ) -> Result<Response, Error> {
        self.request_with_rotation(target, KeyRotation::new(), build)
    }

    /// Send one request and wait for its response.
    ///
    /// The invoke-id and the invocation counter are advanced before `build`
    /// runs, so the frame carries the counter recorded for it. A timeout never
    /// rolls them back.
    pub(crate) fn request_with_rotation(
        &self,
        target: Target,
        rotation: KeyRotation,
        build: impl FnOnce(&mut DlmsClient) -> Result<Vec<u8>, Error>,
    ) -> Result<Response, Error> {
        let to_nic_server = target.to_nic_server();
        let mut message_count = self.session.begin();

        let (packet, pending, timeout) = {
            let mut state = self.state();
            if let Target::Meter(association) = target {
                let client = state.create_client(association, false);
                state.client = Some(client);
            }

            let count = *message_count + 1;
            let increment_invoke_id = state.increment_invoke_id;
            let invoke_id = if increment_invoke_id { (count & 0x0F) as u8 } else { 1 };
            let current_counter = state.invocation_counter;

            let client =
                if to_nic_server { state.nic_client.as_mut() } else { state.client.as_mut() };
            let client = client.ok_or(Error::NotAssociated)?;
            let invocation_counter = if client.security() == Security::None {
                current_counter
            } else {
                current_counter
                    .checked_add(1)
                    .ok_or(Error::InvocationCounterExhausted(current_counter))?
            };
            client.set_invoke_id(invoke_id);
            client.set_invocation_counter(invocation_counter);
            let payload = build(client)?;

            *message_count = count;
            state.set_invocation_counter(invocation_counter);
            for client in state.clients_mut() {
                client.set_invoke_id(invoke_id);
            }
            state.pending_rotation = rotation;

            let packet = OutboundPacket {
                payload,
                node_id: self.node_id,
                gateway_id: state.gateway_id.clone(),
                sink_id: state.sink_id.clone(),
                to_nic_server,
            };
            let pending =
                Pending { to_nic_server, invoke_id: increment_invoke_id.then_some(invoke_id) };
            (packet, pending, state.response_timeout)
        };

        info!(
            "TX: A payload of size {} is sent to node {:#X} ({})",
            packet.payload.len(),
            self.node_id,
            if to_nic_server { "NIC" } else { "passthrough" }
        );
        debug!("TX: {}", hex::encode(&packet.payload));

        self.session.expect(pending);
        if let Err(e) = self.interface.send(packet) {
            self.session.abort();
            self.state().pending_rotation.clear();
            return Err(e.into());
        }

        let response = self.session.wait(timeout);
        if response.error_code == ErrorCode::Timeout {
            warn!("No response received from {:#X} within {:?}", self.node_id, timeout);
        }
        self.confirm_rotation(&response);
        Ok(response)
    }

    /// Keep aside the credentials the NIC accepted in its SET-with-list response.
    fn confirm_rotation(&self, response: &Response) {
        let mut state = self.state();
        let pending = state.pending_rotation.take();
        if pending.is_empty() {
            return;
        }

        let Some(xml) = response.xml.as_deref() else {
            warn!("The set security materials didn't work: {}", response.error_code);
            return;
        };
        let results = access_results(xml);
        if results.len() != pending.len() {
            error!(
                "{} keys were queried to be set but found {} results for this set!",
                pending.len(),
                results.len()
            );
            return;
        }

        for ((slot, value), result) in pending.iter().zip(results) {
            if result == "Success" {
                info!("The {slot} will be set at the next release of the association with the NIC");
                state.confirmed_rotation.insert(*slot, value.clone());
            } else {
                warn!("The {slot} could not be set: {result}");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Association with the NIC
    // ------------------------------------------------------------------------

    /// Open an application association with the NIC. High level security
    /// associations (US, push, FU) run the challenge exchange after the AARE.
    ///
    /// Learns the NIC system title from the AARE. On any failure the NIC client
    /// is dropped and `false` returned, the cause is logged.
    pub fn establish_aa_nic(&self, association: AssociationLevel) -> bool {
        info!("Establishing AA with {:#X} with {association} association", self.node_id);
        match self.associate(association) {
            Ok(()) => {
                info!("Application association has been established with {:#X}", self.node_id);
                true
            }
            Err(e) => {
                error!(
                    "Application association could not be established with {:#X}: {e}",
                    self.node_id
                );
                self.state().nic_client = None;
                false
            }
        }
    }

    fn associate(&self, association: AssociationLevel) -> Result<(), Error> {
        {
            let mut state = self.state();
            let client = state.create_client(association, true);
            if !association.is_public() && !client.has_password() {
                return Err(Error::MissingPassword { association });
            }
            state.nic_client = Some(client);
        }

        info!("AARQ request is sent to {:#X}", self.node_id);
        let response = self.request(Target::Nic, DlmsClient::encode_aarq)?;
        let payload = response.payload.ok_or_else(|| {
            Error::Association(format!("no AARE received ({})", response.error_code))
        })?;

        info!("AARE response from {:#X} is being parsed", self.node_id);
        {
            let mut state = self.state();
            let client = state.nic_client.as_mut().ok_or(Error::NotAssociated)?;
            client.parse_aare(&payload)?;
            if let Some(title) = client.server_system_title() {
                info!("NIC system title of {:#X} is {}", self.node_id, hex::encode(title));
                state.set_nic_system_title(title);
            }
        }

        if matches!(association, AssociationLevel::PublicClient | AssociationLevel::MeterReader) {
            return Ok(());
        }

        info!("Application association request is sent to {:#X}", self.node_id);
        let response = self.request(Target::Nic, |client| client.encode_app_assoc_request())?;
        let payload = response.payload.ok_or_else(|| {
            Error::Association(format!(
                "no application association response ({})",
                response.error_code
            ))
        })?;

        let state = self.state();
        let client = state.nic_client.as_ref().ok_or(Error::NotAssociated)?;
        client.parse_app_assoc_response(&payload)
    }

    /// Release the association with the NIC. The NIC client is dropped whatever
    /// the outcome; credentials the NIC accepted meanwhile are applied when the
    /// release is acknowledged.
    pub fn release_aa_nic(&self) -> bool {
        info!("Releasing AA with {:#X}", self.node_id);
        let result = self.request(Target::Nic, |client| Ok(client.encode_release()));

        let mut state = self.state();
        state.nic_client = None;
        match result {
            Ok(response) if response.is_ok() => {
                info!("Application association with {:#X} has been released", self.node_id);
                let rotation = state.confirmed_rotation.take();
                if !rotation.is_empty() {
                    let config = state.config.rotated(&rotation);
                    state.set_configuration(config);
                    info!("Keys have been updated for meter {:#X}", self.node_id);
                }
                true
            }
            Ok(response) => {
                error!("Release AA response is invalid: {}", response.error_code);
                false
            }
            Err(e) => {
                error!("Release AA could not be sent: {e}");
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Received frames
    // ------------------------------------------------------------------------

    /// Entry point of every frame received from the node, from any thread.
    ///
    /// The frame is tried in order as a NIC status word, a data push and the
    /// response to the request in flight. Anything else goes to the unparsed
    /// callback.
    pub fn on_data_received(&self, packet: Packet, from_nic_server: bool) {
        info!(
            "RX: A payload of size {} has been received from node {:#X} (network {:#X}, {}/{})",
            packet.data_payload.len(),
            self.node_id,
            packet.network_address,
            packet.gw_id,
            packet.sink_id
        );
        debug!("RX: {}", hex::encode(&packet.data_payload));

        if let Some(next) = lock(&self.next_message).take() {
            let _ = next.send(packet.data_payload.clone());
        }

        if self.handle_nic_status_word(&packet.data_payload) {
            return;
        }
        if self.handle_notification(&packet.data_payload) {
            return;
        }
        if self.handle_response(&packet.data_payload, from_nic_server) {
            return;
        }

        info!("A message from {:#X} could not be parsed", self.node_id);
        if let Some(callback) = self.callbacks().unparsed {
            let node_id = self.node_id;
            let payload = packet.data_payload;
            self.worker.execute(Box::new(move || callback(node_id, &payload)));
        }
    }

    fn handle_nic_status_word(&self, payload: &[u8]) -> bool {
        let status = {
            let mut state = self.state();
            let Some(status) = NicStatusWord::from_payload(&state.push_client, payload) else {
                return false;
            };
            info!("The message is a NIC status word");
            debug!("Xml representation of the message: {}", status.notification.frame.xml);
            state.set_nic_system_title(status.nic_system_title);
            state.set_invocation_counter(status.us_invocation_counter);
            status
        };

        if let Some(callback) = self.callbacks().nic_status {
            let node_id = self.node_id;
            self.worker.execute(Box::new(move || callback(node_id, &status)));
        }
        true
    }

    fn handle_notification(&self, payload: &[u8]) -> bool {
        let notification = {
            let state = self.state();
            let Some(notification) =
                WirepasNotification::from_payload(&state.push_client, payload)
            else {
                return false;
            };
            let push_address = state.push_client.client_address();
            if notification.frame.target != push_address {
                warn!(
                    "Notification addressed to {} instead of the push client {push_address}",
                    notification.frame.target
                );
            }
            notification
        };
        info!("The message is a Wirepas notification: {}", notification.push);
        debug!("Xml representation of the message: {}", notification.frame.xml);
        if notification.push == NotificationObis::EventStatusWordPush {
            notification.log_activated_esw_bits();
        }

        if let Some(callback) = self.callbacks().notification {
            let node_id = self.node_id;
            self.worker.execute(Box::new(move || callback(node_id, &notification)));
        }
        true
    }

    fn handle_response(&self, payload: &[u8], from_nic_server: bool) -> bool {
        let Some(pending) = self.session.pending() else {
            return false;
        };
        if pending.to_nic_server != from_nic_server {
            debug!("Frame from the {} while a response from the other device is awaited",
                if from_nic_server { "NIC" } else { "meter" });
        }

        let response = {
            let state = self.state();
            let Some(client) = state.client(from_nic_server) else {
                return false;
            };
            client.decode(payload, pending.invoke_id)
        };
        if !matches!(response.error_code, ErrorCode::Ok | ErrorCode::MessageIsAnError) {
            return false;
        }

        info!("The message is a response from {:#X}", self.node_id);
        self.session.complete(response)
    }

    /// Payload of the next frame received for this meter, `None` after
    /// `timeout`. The frame is still dispatched as usual.
    pub fn next_message(&self, timeout: Duration) -> Option<Vec<u8>> {
        let (sender, receiver) = mpsc::channel();
        *lock(&self.next_message) = Some(sender);
        let message = receiver.recv_timeout(timeout).ok();
        lock(&self.next_message).take();
        message
    }
}

impl Drop for Meter {
    fn drop(&mut self) {
        self.worker.terminate();
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Meter")
            .field("node_id", &format_args!("{:#X}", self.node_id))
            .field("nic_system_title", &state.nic_system_title.map(hex::encode))
            .field("invocation_counter", &state.invocation_counter)
            .field("config", &state.config)
            .field("nic_association", &state.nic_client.as_ref().map(DlmsClient::association))
            .finish()
    }
}

/// Values of the `<DataAccessResult Value="..." />` entries of a translation.
fn access_results(xml: &str) -> Vec<&str> {
    const MARKER: &str = "<DataAccessResult Value=\"";
    xml.match_indices(MARKER)
        .filter_map(|(start, _)| {
            let rest = &xml[start + MARKER.len()..];
            rest.find('"').map(|end| &rest[..end])
        })
        .collect()
}

#[cfg(test)]
mod tests;
