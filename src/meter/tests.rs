use super::*;

use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::action::{ActionResponse, ActionResult};
use crate::association::{
    AareApdu, AarqApdu, ApplicationContextName, AssociationResult, Authentication, Conformance,
    InitiateResponse, ReleaseResponse, ReleaseResponseReason, SourceDiagnostic, hls,
};
use crate::catalogue::ProfileGeneric;
use crate::ciphering::{CipherKeys, CipheredApdu};
use crate::config::{HexKey, KeySlot};
use crate::data::{Data, Date, DateTime, Time};
use crate::data_notification::DataNotification;
use crate::get::{DataAccessResult, GetDataResult, GetResponse};
use crate::set::SetResponse;
use crate::transport::TransportError;
use crate::wrapper::wrap;

const NODE_ID: u32 = 0x0102_0304;
const NIC_TITLE: [u8; 8] = *b"TBC\x00\x01\x02\x03\x04";

const AK: &str = "00112233445566778899AABBCCDDEEFF";
const GUEK: &str = "FFEEDDCCBBAA99887766554433221100";
const KEK: &str = "000102030405060708090A0B0C0D0E0F";
const US_PASSWORD: &str = "5365637265743132";

type Responder = Box<dyn Fn(usize, &OutboundPacket) -> Option<Vec<u8>> + Send + Sync>;

/// Network interface recording every frame sent and answering through a
/// responder, from the sending thread.
#[derive(Default)]
struct RecordingInterface {
    sent: Mutex<Vec<OutboundPacket>>,
    meter: Mutex<Weak<Meter>>,
    responder: Mutex<Option<Responder>>,
    failing: AtomicBool,
}

impl fmt::Debug for RecordingInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingInterface").field("sent", &lock(&self.sent).len()).finish()
    }
}

impl RecordingInterface {
    fn respond(
        &self,
        responder: impl Fn(usize, &OutboundPacket) -> Option<Vec<u8>> + Send + Sync + 'static,
    ) {
        *lock(&self.responder) = Some(Box::new(responder));
    }

    fn sent(&self) -> Vec<OutboundPacket> {
        lock(&self.sent).clone()
    }
}

impl DlmsNetworkInterface for RecordingInterface {
    fn send(&self, packet: OutboundPacket) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError("sink offline".to_string()));
        }
        let number = {
            let mut sent = lock(&self.sent);
            sent.push(packet.clone());
            sent.len()
        };
        let answer =
            lock(&self.responder).as_ref().and_then(|responder| responder(number, &packet));
        let meter = lock(&self.meter).upgrade();
        if let (Some(frame), Some(meter)) = (answer, meter) {
            meter.on_data_received(received(frame), packet.to_nic_server);
        }
        Ok(())
    }
}

fn received(frame: Vec<u8>) -> Packet {
    Packet {
        data_payload: frame,
        network_address: 0xABCDEF,
        gw_id: "gw-1".to_string(),
        sink_id: "sink1".to_string(),
    }
}

fn config() -> MeterConfiguration {
    MeterConfiguration::builder()
        .authentication_key(AK)
        .block_cipher_key(GUEK)
        .key_encryption_key(KEK)
        .mr_password("4D52")
        .us_password(US_PASSWORD)
        .build()
        .unwrap()
}

fn meter_with(
    config: MeterConfiguration,
    options: MeterOptions,
) -> (Arc<Meter>, Arc<RecordingInterface>) {
    let interface = Arc::new(RecordingInterface::default());
    let meter = Arc::new(Meter::new(interface.clone(), NODE_ID, config, options).unwrap());
    *lock(&interface.meter) = Arc::downgrade(&meter);
    (meter, interface)
}

fn key(hex: &str) -> [u8; 16] {
    hex::decode(hex).unwrap().try_into().unwrap()
}

/// Ciphered response of a server whose system title is `title`.
fn sealed(
    source: u16,
    target: u16,
    plaintext: &[u8],
    title: &[u8; 8],
    invocation_counter: u32,
) -> Vec<u8> {
    sealed_with(GUEK, source, target, plaintext, title, invocation_counter)
}

fn sealed_with(
    block_cipher_key: &str,
    source: u16,
    target: u16,
    plaintext: &[u8],
    title: &[u8; 8],
    invocation_counter: u32,
) -> Vec<u8> {
    let (ak, guek) = (key(AK), key(block_cipher_key));
    let keys = CipherKeys { block_cipher_key: Some(&guek), authentication_key: Some(&ak) };
    let security = Security::AuthenticationEncryption;
    let envelope =
        CipheredApdu::seal(plaintext, security, title, invocation_counter, keys).unwrap();
    wrap(source, target, &envelope.encode())
}

/// Plaintext APDU of a ciphered request sent with the system title `title`.
fn opened(packet: &OutboundPacket, title: &[u8; 8]) -> (u32, Vec<u8>) {
    let (ak, guek) = (key(AK), key(GUEK));
    let keys = CipherKeys { block_cipher_key: Some(&guek), authentication_key: Some(&ak) };
    let (_, envelope) = CipheredApdu::parse(&packet.payload[8..]).unwrap();
    (envelope.invocation_counter, envelope.open(title, keys).unwrap())
}

fn invoke_id(number: usize) -> u8 {
    0xC0 | (number as u8 & 0x0F)
}

fn clock_response(number: usize) -> Vec<u8> {
    let value = DateTime::new(Date::new(2024, 5, 17), Time::new(10, 30, 0));
    GetResponse::Normal {
        invoke_id: invoke_id(number),
        result: GetDataResult::Data(Data::from(value)),
    }
    .encode()
}

/// NIC side of a high level security association under US.
fn answer_us_association(interface: &RecordingInterface) {
    let client_challenge = Arc::new(Mutex::new(None::<Vec<u8>>));
    interface.respond(move |number, packet| {
        if !packet.to_nic_server {
            return None;
        }
        match number {
            1 => {
                let (_, aarq) = AarqApdu::parse(&packet.payload[8..]).unwrap();
                *lock(&client_challenge) = aarq.calling_authentication_value;

                let (ak, guek) = (key(AK), key(GUEK));
                let keys =
                    CipherKeys { block_cipher_key: Some(&guek), authentication_key: Some(&ak) };
                let initiate = InitiateResponse::new(Conformance::CLIENT_LN, 0x01F4).encode();
                let security = Security::AuthenticationEncryption;
                let user_information = CipheredApdu::seal(&initiate, security, &NIC_TITLE, 1, keys)
                    .unwrap()
                    .encode();
                let aare = AareApdu {
                    application_context_name:
                        ApplicationContextName::LogicalNameReferencingWithCiphering,
                    result: AssociationResult::Accepted,
                    result_source_diagnostic: SourceDiagnostic::ServiceUser(14),
                    responding_ap_title: Some(NIC_TITLE),
                    mechanism_name: Some(Authentication::High),
                    responding_authentication_value: Some(b"P6wRJ21F".to_vec()),
                    user_information: Some(user_information),
                };
                Some(wrap(DLMS_NIC_ADDRESS, 48, &aare.encode()))
            }
            2 => {
                let challenge = lock(&client_challenge).clone().unwrap();
                let processed = hls::process_challenge(b"Secret12", &challenge);
                let reply = ActionResponse {
                    invoke_id: invoke_id(number),
                    result: ActionResult::Success,
                    return_parameters: Some(GetDataResult::Data(Data::OctetString(processed))),
                };
                Some(sealed(DLMS_NIC_ADDRESS, 48, &reply.encode(), &NIC_TITLE, 2))
            }
            _ => None,
        }
    });
}

fn release_response() -> Vec<u8> {
    let release = ReleaseResponse { reason: Some(ReleaseResponseReason::Normal) };
    wrap(DLMS_NIC_ADDRESS, 48, &release.encode())
}

fn push_apdu(push: NotificationObis, value: Data) -> Vec<u8> {
    let body = Data::Structure(vec![
        Data::OctetString(b"SN42".to_vec()),
        Data::OctetString(push.obis().encode().to_vec()),
        Data::OctetString(vec![0xFF; 12]),
        value,
    ]);
    DataNotification::new(1, None, body).encode()
}

fn push_frame(push: NotificationObis, value: Data) -> Vec<u8> {
    wrap(DLMS_NIC_ADDRESS, 64, &push_apdu(push, value))
}

fn nic_status_value(us_invocation_counter: u32) -> Data {
    Data::Structure(vec![
        Data::OctetString(b"TBC\x01\x02\x03\x04".to_vec()),
        Data::DoubleLongUnsigned(us_invocation_counter),
        Data::BitString("10101000".parse().unwrap()),
    ])
}

#[test]
fn test_public_read_in_passthrough() {
    let (meter, interface) = meter_with(config(), MeterOptions::default());
    interface.respond(|number, _| {
        let response = GetResponse::Normal {
            invoke_id: invoke_id(number),
            result: GetDataResult::Data(Data::OctetString(b"1234".to_vec())),
        };
        Some(wrap(DLMS_METER_ADDRESS, 16, &response.encode()))
    });

    let response = meter.get_meter_serial_number(AssociationLevel::PublicClient).unwrap();

    assert_eq!(response.error_code, ErrorCode::Ok);
    assert_eq!(response.value, Some(Data::OctetString(b"1234".to_vec())));
    let sent = interface.sent();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].to_nic_server);
    assert_eq!(sent[0].node_id, NODE_ID);
    #[rustfmt::skip]
    assert_eq!(sent[0].payload, [
        0x00, 0x01, 0x00, 0x10, 0x00, 0x01, 0x00, 0x0D,
        0xC0, 0x01, 0xC1, 0x00, 0x01, 0x00, 0x00, 0x60, 0x01, 0x00, 0xFF, 0x02, 0x00,
    ]);
    // Public requests are sent in clear and leave the counter alone.
    assert_eq!(meter.invocation_counter(), 0);
    assert_eq!(meter.message_count(), 1);
    assert!(!meter.is_waiting_for_response());
}

#[test]
fn test_establish_us_association() {
    let (meter, interface) = meter_with(config(), MeterOptions::default());
    answer_us_association(&interface);

    assert!(meter.establish_aa_nic(AssociationLevel::UtilitySetting));

    assert_eq!(meter.nic_association(), Some(AssociationLevel::UtilitySetting));
    assert_eq!(meter.nic_system_title(), Some(NIC_TITLE));
    assert_eq!(meter.invocation_counter(), 2);
    let sent = interface.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|packet| packet.to_nic_server));
    // The second leg is ciphered with the client system title.
    let (counter, plaintext) = opened(&sent[1], &NIC_CLIENT_SYSTEM_TITLE);
    assert_eq!(counter, 2);
    assert_eq!(&plaintext[..3], &[0xC3, 0x01, 0xC2]);

    meter.set_nic_system_title_from_flag("TBC").unwrap();
    assert_eq!(meter.nic_system_title(), Some(NIC_TITLE));
}

#[test]
fn test_failed_association_drops_the_nic_client() {
    let options = MeterOptions::default().with_response_timeout(Duration::from_millis(20));
    let (meter, interface) = meter_with(config(), options);
    interface.respond(|_, _| None);

    assert!(!meter.establish_aa_nic(AssociationLevel::UtilitySetting));
    assert_eq!(meter.nic_association(), None);
    assert!(matches!(meter.get_nic_object_list(), Err(Error::NotAssociated)));

    let no_password = MeterConfiguration::builder().block_cipher_key(GUEK).build().unwrap();
    let (meter, interface) = meter_with(no_password, MeterOptions::default());
    assert!(!meter.establish_aa_nic(AssociationLevel::FirmwareUpgrade));
    assert!(interface.sent().is_empty());
}

#[test]
fn test_disconnect_advances_the_invocation_counter() {
    let options =
        MeterOptions::default().with_nic_system_title(NIC_TITLE).with_invocation_counter(100);
    let (meter, interface) = meter_with(config(), options);
    interface.respond(|number, _| {
        let plaintext = if number == 1 {
            ActionResponse {
                invoke_id: invoke_id(number),
                result: ActionResult::Success,
                return_parameters: None,
            }
            .encode()
        } else {
            clock_response(number)
        };
        Some(sealed(DLMS_METER_ADDRESS, 48, &plaintext, &NIC_TITLE, 7))
    });

    let response = meter.disconnect_meter(AssociationLevel::UtilitySetting).unwrap();
    assert_eq!(response.error_code, ErrorCode::Ok);
    let clock = meter.get_meter_clock(AssociationLevel::UtilitySetting).unwrap();
    assert_eq!(clock.error_code, ErrorCode::Ok);
    assert!(clock.value.as_ref().and_then(Data::as_date_time).is_some());

    let sent = interface.sent();
    // In passthrough the meter expects the NIC system title.
    let (disconnect_counter, action) = opened(&sent[0], &NIC_TITLE);
    let (clock_counter, _) = opened(&sent[1], &NIC_TITLE);
    assert_eq!(disconnect_counter, 101);
    assert_eq!(clock_counter, disconnect_counter + 1);
    assert_eq!(meter.invocation_counter(), 102);

    #[rustfmt::skip]
    assert_eq!(action, [
        0xC3, 0x01, 0xC1,
        0x00, 0x46, 0x00, 0x00, 0x60, 0x03, 0x0A, 0xFF, 0x01,
        0x01, 0x0F, 0x00,
    ]);
}

#[test]
fn test_key_rotation_applied_at_release() {
    let (meter, interface) = meter_with(config(), MeterOptions::default());
    answer_us_association(&interface);
    assert!(meter.establish_aa_nic(AssociationLevel::UtilitySetting));

    const NEW_PASSWORD: &str = "4E6577536563726574";
    const NEW_GUEK: &str = "0F0E0D0C0B0A09080706050403020100";
    interface.respond(|number, packet| match number {
        3 => {
            let (_, plaintext) = opened(packet, &NIC_CLIENT_SYSTEM_TITLE);
            assert_eq!(&plaintext[..2], &[0xC1, 0x04]);
            let response = SetResponse::WithList {
                invoke_id: invoke_id(number),
                results: vec![DataAccessResult::Success, DataAccessResult::ReadWriteDenied],
            };
            Some(sealed(DLMS_NIC_ADDRESS, 48, &response.encode(), &NIC_TITLE, 3))
        }
        4 => Some(release_response()),
        _ => None,
    });

    let mut rotation = KeyRotation::new();
    rotation.insert(KeySlot::EncryptionKey, HexKey::key("encryption key", NEW_GUEK).unwrap());
    rotation.insert(KeySlot::UsPassword, HexKey::password("us password", NEW_PASSWORD).unwrap());
    let response = meter.set_nic_security_material_with_list(&rotation).unwrap();
    assert_eq!(response.error_code, ErrorCode::Ok);

    // Written in slot order: the password first, the key is refused.
    let confirmed = meter.confirmed_key_rotation();
    assert_eq!(confirmed.len(), 1);
    assert!(confirmed.get(KeySlot::UsPassword).is_some());
    assert_eq!(meter.configuration().us_password().unwrap().as_str(), US_PASSWORD);

    assert!(meter.release_aa_nic());

    let config = meter.configuration();
    assert_eq!(config.us_password().unwrap().as_str(), NEW_PASSWORD);
    assert_eq!(config.block_cipher_key().unwrap().as_str(), GUEK);
    assert!(meter.confirmed_key_rotation().is_empty());
    assert_eq!(meter.nic_association(), None);
}

#[test]
fn test_key_rotation_with_result_count_mismatch() {
    let (meter, interface) = meter_with(config(), MeterOptions::default());
    answer_us_association(&interface);
    assert!(meter.establish_aa_nic(AssociationLevel::UtilitySetting));

    interface.respond(|number, _| {
        let response = SetResponse::WithList {
            invoke_id: invoke_id(number),
            results: vec![DataAccessResult::Success],
        };
        Some(sealed(DLMS_NIC_ADDRESS, 48, &response.encode(), &NIC_TITLE, 3))
    });

    let response = meter.set_nic_security_material_from_config(&config()).unwrap();

    assert_eq!(response.error_code, ErrorCode::Ok);
    assert!(meter.confirmed_key_rotation().is_empty());
}

#[test]
fn test_rotated_block_cipher_key_reaches_the_push_client() {
    let (meter, interface) = meter_with(config(), MeterOptions::default());
    answer_us_association(&interface);
    assert!(meter.establish_aa_nic(AssociationLevel::UtilitySetting));

    const NEW_GUEK: &str = "0F0E0D0C0B0A09080706050403020100";
    interface.respond(|number, _| match number {
        3 => {
            let response = SetResponse::WithList {
                invoke_id: invoke_id(number),
                results: vec![DataAccessResult::Success, DataAccessResult::Success],
            };
            Some(sealed(DLMS_NIC_ADDRESS, 48, &response.encode(), &NIC_TITLE, 3))
        }
        4 => Some(release_response()),
        _ => None,
    });

    let mut rotation = KeyRotation::new();
    rotation.insert(KeySlot::EncryptionKey, HexKey::key("encryption key", NEW_GUEK).unwrap());
    rotation.insert(KeySlot::UsPassword, HexKey::password("us password", "4E6577").unwrap());
    meter.set_nic_security_material_with_list(&rotation).unwrap();
    assert_eq!(meter.confirmed_key_rotation().len(), 2);
    assert!(meter.release_aa_nic());
    assert_eq!(meter.configuration().block_cipher_key().unwrap().as_str(), NEW_GUEK);

    let (done, events) = mpsc::channel();
    let notified = done.clone();
    meter.set_notification_callback(move |_, notification| {
        let _ = notified.send(format!("{}", notification.push));
    });
    meter.set_unparsed_callback(move |_, _| {
        let _ = done.send("unparsed".to_string());
    });

    let apdu = push_apdu(NotificationObis::BlockLoadProfilePush, Data::Array(Vec::new()));
    let rotated = sealed_with(NEW_GUEK, DLMS_NIC_ADDRESS, 64, &apdu, &NIC_TITLE, 9);
    let stale = sealed_with(GUEK, DLMS_NIC_ADDRESS, 64, &apdu, &NIC_TITLE, 10);
    meter.on_data_received(received(rotated), true);
    meter.on_data_received(received(stale), true);

    let pushed = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(pushed, NotificationObis::BlockLoadProfilePush.to_string());
    assert_eq!(events.recv_timeout(Duration::from_secs(5)).unwrap(), "unparsed");
}

#[test]
fn test_security_material_needs_the_us_association() {
    let (meter, interface) = meter_with(config(), MeterOptions::default());
    let mut rotation = KeyRotation::new();
    rotation.insert(KeySlot::MrPassword, HexKey::password("mr password", "4D52").unwrap());

    assert!(matches!(
        meter.set_nic_security_material_with_list(&KeyRotation::new()),
        Err(Error::InvalidValue(_))
    ));
    assert!(matches!(
        meter.set_nic_security_material_with_list(&rotation),
        Err(Error::NotAssociated)
    ));

    interface.respond(|number, _| {
        (number == 1).then(|| {
            let aare = AareApdu {
                application_context_name:
                    ApplicationContextName::LogicalNameReferencingWithCiphering,
                result: AssociationResult::Accepted,
                result_source_diagnostic: SourceDiagnostic::ServiceUser(0),
                responding_ap_title: Some(NIC_TITLE),
                mechanism_name: Some(Authentication::Low),
                responding_authentication_value: None,
                user_information: None,
            };
            wrap(DLMS_NIC_ADDRESS, 32, &aare.encode())
        })
    });
    assert!(meter.establish_aa_nic(AssociationLevel::MeterReader));

    assert!(matches!(
        meter.set_nic_security_material_with_list(&rotation),
        Err(Error::WrongAssociation {
            expected: AssociationLevel::UtilitySetting,
            found: AssociationLevel::MeterReader,
        })
    ));
    assert_eq!(interface.sent().len(), 1);
}

#[test]
fn test_nic_status_word_updates_the_meter() {
    let options = MeterOptions::default().with_response_timeout(Duration::from_millis(20));
    let (meter, interface) = meter_with(config(), options);
    let calls = Arc::new(AtomicUsize::new(0));
    let (done, statuses) = mpsc::channel();
    let counter = Arc::clone(&calls);
    meter.set_nic_status_callback(move |node_id, status| {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = done.send((node_id, status.us_invocation_counter));
    });

    let status_word = push_frame(NotificationObis::NicStatusWord, nic_status_value(42));
    meter.on_data_received(received(status_word), true);

    assert_eq!(statuses.recv_timeout(Duration::from_secs(5)).unwrap(), (NODE_ID, 42));
    assert_eq!(meter.nic_system_title(), Some(NIC_TITLE));
    assert_eq!(meter.invocation_counter(), 42);

    interface.respond(|_, _| None);
    meter.get_meter_clock(AssociationLevel::UtilitySetting).unwrap();
    let (counter, _) = opened(&interface.sent()[0], &NIC_TITLE);
    assert_eq!(counter, 43);

    meter.terminate();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_nic_status_word_does_not_answer_the_pending_request() {
    let options = MeterOptions::default()
        .with_nic_system_title(NIC_TITLE)
        .with_response_timeout(Duration::from_millis(50));
    let (meter, interface) = meter_with(config(), options);
    let (done, statuses) = mpsc::channel();
    meter.set_nic_status_callback(move |_, status| {
        let _ = done.send(status.us_invocation_counter);
    });
    interface.respond(|_, _| {
        Some(push_frame(NotificationObis::NicStatusWord, nic_status_value(42)))
    });

    let response = meter.get_meter_clock(AssociationLevel::UtilitySetting).unwrap();

    assert_eq!(response.error_code, ErrorCode::Timeout);
    assert_eq!(statuses.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    assert_eq!(meter.invocation_counter(), 42);
    assert!(!meter.is_waiting_for_response());
}

#[test]
fn test_notification_and_unparsed_callbacks() {
    let (meter, _interface) = meter_with(config(), MeterOptions::default());
    let (done, events) = mpsc::channel();
    let notified = done.clone();
    meter.set_notification_callback(move |_, notification| {
        let _ = notified.send(format!("{}", notification.push));
    });
    meter.set_unparsed_callback(move |_, payload| {
        let _ = done.send(hex::encode(payload));
    });

    let esw = Data::BitString("1000000000000".parse().unwrap());
    meter.on_data_received(received(push_frame(NotificationObis::EventStatusWordPush, esw)), true);
    meter.on_data_received(received(vec![0xFE, 0xFE, 0xFE]), false);

    let pushed = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(pushed, NotificationObis::EventStatusWordPush.to_string());
    assert_eq!(events.recv_timeout(Duration::from_secs(5)).unwrap(), "fefefe");
}

#[test]
fn test_timeout_keeps_counters_advanced() {
    let options = MeterOptions::default()
        .with_nic_system_title(NIC_TITLE)
        .with_response_timeout(Duration::from_millis(20));
    let (meter, interface) = meter_with(config(), options);
    interface.respond(|_, _| None);

    let response = meter.get_meter_clock(AssociationLevel::UtilitySetting).unwrap();

    assert_eq!(response.error_code, ErrorCode::Timeout);
    assert_eq!(meter.message_count(), 1);
    assert_eq!(meter.invocation_counter(), 1);
    assert!(!meter.is_waiting_for_response());

    meter.get_meter_clock(AssociationLevel::UtilitySetting).unwrap();
    let sent = interface.sent();
    assert_eq!(opened(&sent[0], &NIC_TITLE).0, 1);
    assert_eq!(opened(&sent[1], &NIC_TITLE).0, 2);
}

#[test]
fn test_invocation_counter_never_wraps() {
    let options = MeterOptions::default()
        .with_nic_system_title(NIC_TITLE)
        .with_invocation_counter(u32::MAX - 1)
        .with_response_timeout(Duration::from_millis(1));
    let (meter, interface) = meter_with(config(), options);

    meter.get_meter_clock(AssociationLevel::UtilitySetting).unwrap();
    assert!(matches!(
        meter.get_meter_clock(AssociationLevel::UtilitySetting),
        Err(Error::InvocationCounterExhausted(u32::MAX))
    ));

    let sent = interface.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(opened(&sent[0], &NIC_TITLE).0, u32::MAX);
    assert_eq!(meter.invocation_counter(), u32::MAX);
    assert_eq!(meter.message_count(), 1);

    // Requests in clear do not use the counter.
    meter.get_meter_serial_number(AssociationLevel::PublicClient).unwrap();
    assert_eq!(interface.sent().len(), 2);
}

#[test]
fn test_invoke_id_wraps_around() {
    let options = MeterOptions::default().with_response_timeout(Duration::from_millis(1));
    let (meter, interface) = meter_with(MeterConfiguration::default(), options);

    for _ in 0..17 {
        meter.get_meter_serial_number(AssociationLevel::PublicClient).unwrap();
    }
    meter.set_increment_invoke_id(false);
    meter.get_meter_serial_number(AssociationLevel::PublicClient).unwrap();

    let invoke_ids: Vec<u8> = interface.sent().iter().map(|packet| packet.payload[10]).collect();
    assert_eq!(invoke_ids[0], 0xC1);
    assert_eq!(invoke_ids[14], 0xCF);
    assert_eq!(invoke_ids[15], 0xC0);
    assert_eq!(invoke_ids[16], 0xC1);
    assert_eq!(invoke_ids[17], 0xC1);
    assert_eq!(meter.message_count(), 18);
}

#[test]
fn test_late_response_is_not_taken_for_the_next_request() {
    let options = MeterOptions::default().with_response_timeout(Duration::from_millis(1));
    let (meter, _interface) = meter_with(MeterConfiguration::default(), options);
    let (done, unparsed) = mpsc::channel();
    meter.set_unparsed_callback(move |_, _| {
        let _ = done.send(());
    });

    meter.get_meter_serial_number(AssociationLevel::PublicClient).unwrap();
    let late =
        GetResponse::Normal { invoke_id: 0xC1, result: GetDataResult::Data(Data::Unsigned(1)) };
    meter.on_data_received(received(wrap(DLMS_METER_ADDRESS, 16, &late.encode())), false);

    unparsed.recv_timeout(Duration::from_secs(5)).unwrap();
}

#[test]
fn test_catalogue_requests() {
    let options = MeterOptions::default().with_response_timeout(Duration::from_millis(1));
    let (meter, interface) = meter_with(MeterConfiguration::default(), options);

    let public = AssociationLevel::PublicClient;
    meter.get_meter_profile_capture_objects(ProfileGeneric::BlockLoad, public).unwrap();
    meter.get_meter_billing_profile(2, 3, AssociationLevel::PublicClient).unwrap();

    let sent = interface.sent();
    // class 7, 1.0.99.1.0.255, attribute 3
    assert_eq!(&sent[0].payload[11..20], &[0x00, 0x07, 0x01, 0x00, 0x63, 0x01, 0x00, 0xFF, 0x03]);
    // entries 2..=4 of 1.0.98.1.0.255
    assert_eq!(&sent[1].payload[20..24], &[0x01, 0x02, 0x02, 0x04]);
    assert_eq!(
        &sent[1].payload[24..34],
        &[0x06, 0x00, 0x00, 0x00, 0x02, 0x06, 0x00, 0x00, 0x00, 0x04]
    );

    assert!(matches!(
        meter.get_meter_profile_scaler(ProfileGeneric::NamePlate, AssociationLevel::PublicClient),
        Err(Error::InvalidValue(_))
    ));
    assert!(matches!(
        meter.get_meter_event_log(ProfileGeneric::Billing, 1, 1, AssociationLevel::PublicClient),
        Err(Error::InvalidValue(_))
    ));
    assert!(matches!(meter.set_nic_instantaneous_push_interval(45), Err(Error::InvalidValue(_))));
    assert!(matches!(meter.set_nic_push_enable_configuration("101"), Err(Error::InvalidValue(_))));
    assert!(matches!(
        meter.set_nic_push_enable_configuration("1111000000x"),
        Err(Error::InvalidValue(_))
    ));
    assert!(matches!(meter.set_nic_instantaneous_push_interval(30), Err(Error::NotAssociated)));
    assert_eq!(interface.sent().len(), 2);
}

#[test]
fn test_settings_flow_into_requests() {
    let options = MeterOptions::default().with_response_timeout(Duration::from_millis(1));
    let (meter, interface) = meter_with(MeterConfiguration::default(), options);

    meter.update_network_settings("gw-7", "sink0");
    meter.update_meter(Some(config()), MeterCallbacks::default(), Some(Duration::from_millis(2)));
    meter.get_meter_serial_number(AssociationLevel::PublicClient).unwrap();

    let sent = interface.sent();
    assert_eq!(sent[0].gateway_id.as_deref(), Some("gw-7"));
    assert_eq!(sent[0].sink_id.as_deref(), Some("sink0"));
    assert_eq!(meter.response_timeout(), Duration::from_millis(2));
    assert_eq!(meter.network_settings(), (Some("gw-7".to_string()), Some("sink0".to_string())));
    assert!(meter.configuration().us_password().is_some());

    assert!(matches!(
        meter.set_nic_system_title_from_flag("TB"),
        Err(ConfigurationError::SystemTitleFlag(_))
    ));
}

#[test]
fn test_transport_failure_is_an_error() {
    let (meter, interface) = meter_with(MeterConfiguration::default(), MeterOptions::default());
    interface.failing.store(true, Ordering::SeqCst);

    assert!(matches!(
        meter.get_meter_serial_number(AssociationLevel::PublicClient),
        Err(Error::Transport(_))
    ));
    assert!(!meter.is_waiting_for_response());
}

#[test]
fn test_access_results() {
    let xml = "<Result Qty=\"02\" >\n<DataAccessResult Value=\"Success\" />\n\
               <DataAccessResult Value=\"ReadWriteDenied\" />";
    assert_eq!(access_results(xml), vec!["Success", "ReadWriteDenied"]);
    assert!(access_results("<SetResponse />").is_empty());
}
