//! One DLMS logical endpoint: addresses, authentication and cipher state.
//!
//! A [`DlmsClient`] produces wrapper frames for one request at a time and
//! classifies the frames coming back. It never talks to the network itself, the
//! [`Meter`](crate::Meter) owns the clients and serializes their requests.

use log::{debug, warn};

use crate::action::{ActionRequest, MethodDescriptor};
use crate::apdu::Apdu;
use crate::association::{
    AarqApdu, ApplicationContextName, Authentication, InitiateRequest, ReleaseRequest, hls,
};
use crate::association_level::AssociationLevel;
use crate::ciphering::{CipherError, CipherKeys, CipheredApdu};
use crate::config::MeterConfiguration;
use crate::data::{Data, DataType};
use crate::error::Error;
use crate::get::{AccessSelector, AttributeDescriptor, GetRequest};
use crate::key_wrap;
use crate::response::{ErrorCode, Response};
use crate::set::SetRequest;
use crate::translator::{Translation, TranslationFailure, Translator};
use crate::wrapper::wrap;
use crate::{ObisCode, Security};

/// Server address of the meter logical device, reached in passthrough.
pub const DLMS_METER_ADDRESS: u16 = 1;

/// Server address of the NIC logical device.
pub const DLMS_NIC_ADDRESS: u16 = 100;

/// Local system title used when talking to the NIC.
pub const NIC_CLIENT_SYSTEM_TITLE: [u8; 8] = *b"CLI12345";

/// Maximum APDU size announced in the AARQ.
pub const MAX_RECEIVE_PDU_SIZE: u16 = 0xFFFF;

/// Priority bits of the invoke-id-and-priority byte (high priority, confirmed).
const INVOKE_ID_PRIORITY: u8 = 0xC0;

/// One attribute written by a SET-Request-With-List.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteItem {
    pub class_id: u16,
    pub obis: ObisCode,
    pub attribute_id: i8,
    pub data_type: DataType,
    pub value: Data,
}

impl WriteItem {
    pub fn new(class_id: u16, obis: ObisCode, attribute_id: i8, value: Data) -> Self {
        Self { class_id, obis, attribute_id, data_type: value.data_type(), value }
    }

    fn descriptor(&self) -> AttributeDescriptor {
        AttributeDescriptor::new(self.class_id, self.obis, self.attribute_id)
    }
}

/// Key material and counters of a client.
#[derive(Clone, Default)]
struct CipherState {
    security: Security,
    authentication_key: Option<[u8; 16]>,
    block_cipher_key: Option<[u8; 16]>,
    dedicated_key: Option<[u8; 16]>,
    key_encryption_key: Option<[u8; 16]>,
    invocation_counter: u32,
}

impl CipherState {
    fn keys(&self) -> CipherKeys<'_> {
        CipherKeys {
            block_cipher_key: self.block_cipher_key.as_ref(),
            authentication_key: self.authentication_key.as_ref(),
        }
    }
}

/// Client side of one association with one logical device.
pub struct DlmsClient {
    association: AssociationLevel,
    server_address: u16,
    password: Option<Vec<u8>>,
    cipher: CipherState,
    invoke_id: u8,
    system_title: [u8; 8],
    server_system_title: Option<[u8; 8]>,
    client_challenge: Option<Vec<u8>>,
    server_challenge: Option<Vec<u8>>,
}

impl DlmsClient {
    /// A client of `association` towards `server_address`, keyed from `config`.
    ///
    /// The public client never carries key material: its requests are sent in
    /// clear whatever the configuration holds.
    pub fn new(
        association: AssociationLevel,
        server_address: u16,
        config: &MeterConfiguration,
        system_title: [u8; 8],
    ) -> Self {
        let mut client = Self {
            association,
            server_address,
            password: None,
            cipher: CipherState::default(),
            invoke_id: 1,
            system_title,
            server_system_title: None,
            client_challenge: None,
            server_challenge: None,
        };
        client.set_keys(config);
        client
    }

    /// Load keys and password from `config` and derive the security level again.
    pub fn set_keys(&mut self, config: &MeterConfiguration) {
        if self.association.is_public() {
            self.password = None;
            self.cipher = CipherState {
                invocation_counter: self.cipher.invocation_counter,
                ..CipherState::default()
            };
            return;
        }

        let key = |value: Option<&crate::HexKey>| value.and_then(|k| k.key_bytes());
        self.password = config.password_for(self.association).map(|p| p.as_bytes().to_vec());
        self.cipher.authentication_key = key(config.authentication_key());
        self.cipher.block_cipher_key = key(config.block_cipher_key());
        self.cipher.dedicated_key = key(config.dedicated_key());
        self.cipher.key_encryption_key = key(config.key_encryption_key());
        self.cipher.security = Security::derive(
            self.cipher.authentication_key.is_some(),
            self.cipher.block_cipher_key.is_some(),
        );
    }

    pub fn association(&self) -> AssociationLevel {
        self.association
    }

    pub fn client_address(&self) -> u16 {
        self.association.client_address()
    }

    pub fn server_address(&self) -> u16 {
        self.server_address
    }

    pub fn security(&self) -> Security {
        self.cipher.security
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    fn required_password(&self) -> Result<&[u8], Error> {
        self.password.as_deref().ok_or(Error::MissingPassword { association: self.association })
    }

    pub fn invocation_counter(&self) -> u32 {
        self.cipher.invocation_counter
    }

    pub fn set_invocation_counter(&mut self, invocation_counter: u32) {
        self.cipher.invocation_counter = invocation_counter;
    }

    /// Invoke-id of the next request, 0..=15.
    pub fn invoke_id(&self) -> u8 {
        self.invoke_id
    }

    pub fn set_invoke_id(&mut self, invoke_id: u8) {
        self.invoke_id = invoke_id & 0x0F;
    }

    pub fn system_title(&self) -> [u8; 8] {
        self.system_title
    }

    pub fn set_system_title(&mut self, system_title: [u8; 8]) {
        self.system_title = system_title;
    }

    /// System title of the server, used to open envelopes that do not carry one.
    pub fn server_system_title(&self) -> Option<[u8; 8]> {
        self.server_system_title
    }

    pub fn set_server_system_title(&mut self, system_title: [u8; 8]) {
        self.server_system_title = Some(system_title);
    }

    fn invoke_id_and_priority(&self) -> u8 {
        INVOKE_ID_PRIORITY | self.invoke_id
    }

    fn application_context_name(&self) -> ApplicationContextName {
        if self.cipher.security.is_secured() {
            ApplicationContextName::LogicalNameReferencingWithCiphering
        } else {
            ApplicationContextName::LogicalNameReferencing
        }
    }

    /// Protect `apdu` with the current cipher state and wrap it.
    fn frame(&self, apdu: Vec<u8>) -> Result<Vec<u8>, Error> {
        let apdu = if self.cipher.security.is_secured() {
            CipheredApdu::seal(
                &apdu,
                self.cipher.security,
                &self.system_title,
                self.cipher.invocation_counter,
                self.cipher.keys(),
            )?
            .encode()
        } else {
            apdu
        };
        Ok(wrap(self.client_address(), self.server_address, &apdu))
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    pub fn encode_get(
        &self,
        obis: ObisCode,
        class_id: u16,
        attribute_id: i8,
    ) -> Result<Vec<u8>, Error> {
        self.encode_get_request(obis, class_id, attribute_id, None)
    }

    /// GET with a selective access descriptor (profile generic by entry or by range).
    pub fn encode_get_with_access(
        &self,
        obis: ObisCode,
        class_id: u16,
        attribute_id: i8,
        access: AccessSelector,
    ) -> Result<Vec<u8>, Error> {
        self.encode_get_request(obis, class_id, attribute_id, Some(access))
    }

    fn encode_get_request(
        &self,
        obis: ObisCode,
        class_id: u16,
        attribute_id: i8,
        access_selection: Option<AccessSelector>,
    ) -> Result<Vec<u8>, Error> {
        let request = GetRequest::Normal {
            invoke_id: self.invoke_id_and_priority(),
            attribute: AttributeDescriptor::new(class_id, obis, attribute_id),
            access_selection,
        };
        self.frame(request.encode())
    }

    /// SET of one attribute. `value` must be of the declared `data_type`.
    pub fn encode_set(
        &self,
        obis: ObisCode,
        class_id: u16,
        attribute_id: i8,
        data_type: DataType,
        value: Data,
    ) -> Result<Vec<u8>, Error> {
        check_type(data_type, &value)?;
        let request = SetRequest::Normal {
            invoke_id: self.invoke_id_and_priority(),
            attribute: AttributeDescriptor::new(class_id, obis, attribute_id),
            value,
        };
        self.frame(request.encode())
    }

    pub fn encode_action(
        &self,
        obis: ObisCode,
        class_id: u16,
        method_id: i8,
        parameters: Option<Data>,
    ) -> Result<Vec<u8>, Error> {
        let request = ActionRequest {
            invoke_id: self.invoke_id_and_priority(),
            method: MethodDescriptor::new(class_id, obis, method_id),
            parameters,
        };
        self.frame(request.encode())
    }

    /// SET-Request-With-List over `items`, in order.
    pub fn encode_set_list(&self, items: &[WriteItem]) -> Result<Vec<u8>, Error> {
        if items.is_empty() {
            return Err(Error::InvalidValue("a SET list needs at least one item".to_string()));
        }
        let mut list = Vec::with_capacity(items.len());
        for item in items {
            check_type(item.data_type, &item.value)?;
            list.push((item.descriptor(), item.value.clone()));
        }
        let request =
            SetRequest::WithList { invoke_id: self.invoke_id_and_priority(), items: list };
        self.frame(request.encode())
    }

    /// AES key wrap of `key` under the key encryption key.
    pub fn wrap_key(&self, key: &[u8]) -> Result<Vec<u8>, Error> {
        let kek = self.cipher.key_encryption_key.as_ref().ok_or(Error::MissingKeyEncryptionKey)?;
        Ok(key_wrap::wrap(kek, key)?)
    }

    // ------------------------------------------------------------------------
    // Association
    // ------------------------------------------------------------------------

    /// AARQ opening the association. With high level security a fresh
    /// client-to-server challenge is drawn and kept for the second leg.
    pub fn encode_aarq(&mut self) -> Result<Vec<u8>, Error> {
        let authentication = self.association.authentication();
        let calling_authentication_value = match authentication {
            Authentication::None => None,
            Authentication::Low => Some(self.required_password()?.to_vec()),
            Authentication::High => {
                let challenge = hls::challenge().map_err(Error::Random)?;
                self.client_challenge = Some(challenge.clone());
                Some(challenge)
            }
        };
        self.server_challenge = None;

        let dedicated_key = self.cipher.dedicated_key.map(|key| key.to_vec());
        let initiate = InitiateRequest::new(dedicated_key, MAX_RECEIVE_PDU_SIZE).encode();
        let secured = self.cipher.security.is_secured();
        let user_information = if secured {
            CipheredApdu::seal(
                &initiate,
                self.cipher.security,
                &self.system_title,
                self.cipher.invocation_counter,
                self.cipher.keys(),
            )?
            .encode()
        } else {
            initiate
        };

        let aarq = AarqApdu {
            application_context_name: self.application_context_name(),
            calling_ap_title: secured.then_some(self.system_title),
            authentication,
            calling_authentication_value,
            user_information,
        };
        Ok(wrap(self.client_address(), self.server_address, &aarq.encode()))
    }

    /// Check an AARE, learning the server system title and challenge it carries.
    pub fn parse_aare(&mut self, frame: &[u8]) -> Result<(), Error> {
        let translation = self
            .translator()
            .translate(frame)
            .ok_or_else(|| Error::Association(format!("undecodable AARE {}", hex::encode(frame))))?;

        let Some(Apdu::Aare(aare)) = translation.apdu else {
            return Err(Error::Association(format!(
                "expected an AARE, received {}",
                translation.xml
            )));
        };
        if !aare.is_accepted() {
            return Err(Error::Association(format!(
                "association rejected: {} ({:?})",
                aare.result, aare.result_source_diagnostic
            )));
        }
        if let Some(failure) = translation.failure {
            return Err(Error::Association(format!("invalid AARE user information: {failure:?}")));
        }

        if let Some(title) = aare.responding_ap_title {
            debug!("Server system title {}", hex::encode(title));
            self.server_system_title = Some(title);
        }
        self.server_challenge = aare.responding_authentication_value;
        Ok(())
    }

    /// Second leg of high level security: `reply_to_HLS_authentication` with `f(StoC)`.
    pub fn encode_app_assoc_request(&self) -> Result<Vec<u8>, Error> {
        let password = self.required_password()?;
        let server_challenge = self
            .server_challenge
            .as_deref()
            .ok_or_else(|| Error::Association("the AARE carried no server challenge".to_string()))?;

        let request = hls::reply_request(self.invoke_id_and_priority(), password, server_challenge);
        self.frame(request.encode())
    }

    /// Check that the server answered the challenge with `f(CtoS)`.
    pub fn parse_app_assoc_response(&self, frame: &[u8]) -> Result<(), Error> {
        let response = self.decode(frame, Some(self.invoke_id));
        if !response.is_ok() {
            return Err(Error::Association(format!(
                "application association failed: {}",
                response.error_code
            )));
        }

        let reply = response.value.as_ref().and_then(Data::as_bytes).unwrap_or_default();
        let (Some(password), Some(challenge)) = (&self.password, &self.client_challenge) else {
            return Err(Error::Association("no challenge was sent".to_string()));
        };
        if !hls::verify_server_reply(password, challenge, reply) {
            return Err(Error::Association("server failed the HLS challenge".to_string()));
        }
        Ok(())
    }

    pub fn encode_release(&self) -> Vec<u8> {
        wrap(self.client_address(), self.server_address, &ReleaseRequest::normal().encode())
    }

    // ------------------------------------------------------------------------
    // Responses
    // ------------------------------------------------------------------------

    /// Translator opening envelopes with this client's keys.
    pub fn translator(&self) -> Translator<'_> {
        Translator::new(
            self.cipher.keys(),
            self.cipher.dedicated_key.as_ref(),
            self.server_system_title.as_ref(),
        )
    }

    pub fn translate(&self, frame: &[u8]) -> Option<String> {
        self.translator().frame_to_xml(frame)
    }

    /// Classify a response frame.
    pub fn decode(&self, frame: &[u8], expected_invoke_id: Option<u8>) -> Response {
        let Some(translation) = self.translator().translate(frame) else {
            return Response::new(ErrorCode::Error, None, Some(frame.to_vec()), None);
        };
        debug!("Received:\n{}", translation.xml);

        let error_code = classify(&translation);
        let value = translation.apdu.as_ref().and_then(response_value);

        if let Some(expected) = expected_invoke_id {
            if let Some(received) = translation.apdu.as_ref().and_then(Apdu::invoke_id) {
                if received & 0x0F != expected & 0x0F {
                    warn!(
                        "Wrong invoke id in response, expected {} received {}",
                        expected & 0x0F,
                        received & 0x0F
                    );
                }
            }
        }
        let header = translation.header;
        if header.source != self.server_address || header.target != self.client_address() {
            warn!(
                "Unexpected addresses in response, expected {} -> {} received {} -> {}",
                self.server_address,
                self.client_address(),
                header.source,
                header.target
            );
        }

        Response::new(error_code, Some(translation.xml), Some(frame.to_vec()), value)
    }
}

impl std::fmt::Debug for DlmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DlmsClient")
            .field("association", &self.association)
            .field("server_address", &self.server_address)
            .field("security", &self.cipher.security)
            .field("invocation_counter", &self.cipher.invocation_counter)
            .field("invoke_id", &self.invoke_id)
            .field("system_title", &hex::encode(self.system_title))
            .field("server_system_title", &self.server_system_title.map(hex::encode))
            .finish_non_exhaustive()
    }
}

fn check_type(expected: DataType, value: &Data) -> Result<(), Error> {
    let found = value.data_type();
    if found != expected {
        return Err(Error::ValueType { expected, found });
    }
    Ok(())
}

fn classify(translation: &Translation) -> ErrorCode {
    match &translation.failure {
        Some(TranslationFailure::Deciphering(
            CipherError::TagMismatch | CipherError::MissingKey(_),
        )) => ErrorCode::InvalidKeys,
        Some(_) => ErrorCode::InvalidMessage,
        None => match &translation.apdu {
            None => ErrorCode::InvalidMessage,
            Some(apdu) if apdu.is_service_error() => ErrorCode::MessageIsAnError,
            Some(_) => ErrorCode::Ok,
        },
    }
}

fn response_value(apdu: &Apdu) -> Option<Data> {
    match apdu {
        Apdu::GetResponse(response) => response.value(),
        Apdu::ActionResponse(response) => response.value(),
        Apdu::DataNotification(notification) => Some(notification.notification_body.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::{
        AareApdu, AssociationResult, Conformance, InitiateResponse, SourceDiagnostic,
    };
    use crate::action::{ActionResponse, ActionResult};
    use crate::get::{DataAccessResult, GetDataResult, GetResponse};
    use crate::set::SetResponse;

    const AK: &str = "00112233445566778899AABBCCDDEEFF";
    const GUEK: &str = "FFEEDDCCBBAA99887766554433221100";
    const KEK: &str = "000102030405060708090A0B0C0D0E0F";
    const SERVER_TITLE: [u8; 8] = *b"TBC\x00\x01\x02\x03\x04";

    fn config() -> MeterConfiguration {
        MeterConfiguration::builder()
            .authentication_key(AK)
            .block_cipher_key(GUEK)
            .key_encryption_key(KEK)
            .us_password("5365637265743132")
            .build()
            .unwrap()
    }

    fn nic_client() -> DlmsClient {
        let mut client = DlmsClient::new(
            AssociationLevel::UtilitySetting,
            DLMS_NIC_ADDRESS,
            &config(),
            NIC_CLIENT_SYSTEM_TITLE,
        );
        client.set_server_system_title(SERVER_TITLE);
        client
    }

    /// A server side sealing responses the way the NIC does.
    fn server_frame(client: &DlmsClient, plaintext: &[u8], invocation_counter: u32) -> Vec<u8> {
        let keys = client.cipher.keys();
        let envelope = CipheredApdu::seal(
            plaintext,
            Security::AuthenticationEncryption,
            &SERVER_TITLE,
            invocation_counter,
            keys,
        )
        .unwrap();
        wrap(client.server_address(), client.client_address(), &envelope.encode())
    }

    #[test]
    fn test_public_client_sends_in_clear() {
        let client = DlmsClient::new(
            AssociationLevel::PublicClient,
            DLMS_METER_ADDRESS,
            &config(),
            NIC_CLIENT_SYSTEM_TITLE,
        );
        assert_eq!(client.security(), Security::None);
        assert!(!client.has_password());

        let frame = client.encode_get(ObisCode::new(0, 0, 96, 1, 0, 255), 1, 2).unwrap();

        #[rustfmt::skip]
        assert_eq!(frame, [
            0x00, 0x01, 0x00, 0x10, 0x00, 0x01, 0x00, 0x0D,
            0xC0, 0x01, 0xC1, 0x00, 0x01, 0x00, 0x00, 0x60, 0x01, 0x00, 0xFF, 0x02, 0x00,
        ]);
    }

    #[test]
    fn test_security_derivation() {
        let client = nic_client();
        assert_eq!(client.security(), Security::AuthenticationEncryption);
        assert!(client.has_password());

        let only_guek = MeterConfiguration::builder().block_cipher_key(GUEK).build().unwrap();
        let client = DlmsClient::new(
            AssociationLevel::MeterReader,
            DLMS_METER_ADDRESS,
            &only_guek,
            SERVER_TITLE,
        );
        assert_eq!(client.security(), Security::Encryption);
    }

    #[test]
    fn test_ciphered_get_uses_invocation_counter() {
        let mut client = nic_client();
        client.set_invocation_counter(7);
        client.set_invoke_id(3);

        let frame = client.encode_get(ObisCode::new(0, 0, 1, 0, 0, 255), 8, 2).unwrap();
        let (_, envelope) = CipheredApdu::parse(&frame[8..]).unwrap();

        assert_eq!(envelope.tag, 0xC8);
        assert_eq!(envelope.invocation_counter, 7);
        assert_eq!(envelope.security_control.byte(), 0x30);

        let plaintext = envelope.open(&NIC_CLIENT_SYSTEM_TITLE, client.cipher.keys()).unwrap();
        assert_eq!(&plaintext[..3], &[0xC0, 0x01, 0xC3]);
    }

    #[test]
    fn test_set_rejects_mismatched_type() {
        let client = nic_client();
        let result = client.encode_set(
            ObisCode::new(0, 0, 17, 0, 0, 255),
            71,
            4,
            DataType::DoubleLongUnsigned,
            Data::LongUnsigned(5),
        );

        assert!(matches!(
            result,
            Err(Error::ValueType {
                expected: DataType::DoubleLongUnsigned,
                found: DataType::LongUnsigned
            })
        ));
    }

    #[test]
    fn test_set_list_requires_items() {
        assert!(matches!(nic_client().encode_set_list(&[]), Err(Error::InvalidValue(_))));
    }

    #[test]
    fn test_wrap_key_needs_kek() {
        let client = nic_client();
        assert_eq!(client.wrap_key(&[0x11; 16]).unwrap().len(), 24);

        let no_kek = MeterConfiguration::builder().block_cipher_key(GUEK).build().unwrap();
        let client = DlmsClient::new(
            AssociationLevel::UtilitySetting,
            DLMS_NIC_ADDRESS,
            &no_kek,
            SERVER_TITLE,
        );
        assert!(matches!(client.wrap_key(&[0x11; 16]), Err(Error::MissingKeyEncryptionKey)));
    }

    #[test]
    fn test_decode_ciphered_get_response() {
        let mut client = nic_client();
        client.set_invoke_id(2);
        let frame = server_frame(&client, &[0xC4, 0x01, 0xC2, 0x00, 0x09, 0x02, 0x31, 0x32], 10);

        let response = client.decode(&frame, Some(2));

        assert_eq!(response.error_code, ErrorCode::Ok);
        assert_eq!(response.value, Some(Data::OctetString(vec![0x31, 0x32])));
        assert!(response.xml.unwrap().contains("Decrypted data"));
        assert_eq!(response.payload, Some(frame));
    }

    #[test]
    fn test_decode_with_wrong_keys() {
        let client = nic_client();
        let frame = server_frame(&client, &[0xC4, 0x01, 0xC1, 0x00, 0x11, 0x01], 10);

        let other = MeterConfiguration::builder()
            .authentication_key(AK)
            .block_cipher_key(KEK)
            .build()
            .unwrap();
        let mut wrong = DlmsClient::new(
            AssociationLevel::UtilitySetting,
            DLMS_NIC_ADDRESS,
            &other,
            NIC_CLIENT_SYSTEM_TITLE,
        );
        wrong.set_server_system_title(SERVER_TITLE);

        assert_eq!(wrong.decode(&frame, None).error_code, ErrorCode::InvalidKeys);
    }

    #[test]
    fn test_decode_classification() {
        let client = DlmsClient::new(
            AssociationLevel::PublicClient,
            DLMS_METER_ADDRESS,
            &MeterConfiguration::default(),
            NIC_CLIENT_SYSTEM_TITLE,
        );

        let denied = GetResponse::Normal {
            invoke_id: 0xC1,
            result: GetDataResult::DataAccessError(DataAccessResult::ReadWriteDenied),
        };
        let frame = wrap(1, 16, &denied.encode());
        assert_eq!(client.decode(&frame, Some(1)).error_code, ErrorCode::MessageIsAnError);

        let set_ok = SetResponse::Normal { invoke_id: 0xC1, result: DataAccessResult::Success };
        let frame = wrap(1, 16, &set_ok.encode());
        assert_eq!(client.decode(&frame, Some(1)).error_code, ErrorCode::Ok);

        let incomplete = GetResponse::WithDataBlock {
            invoke_id: 0xC1,
            last_block: false,
            block_number: 1,
            raw_data: Ok(vec![0x01, 0x02]),
        };
        let frame = wrap(1, 16, &incomplete.encode());
        assert_eq!(client.decode(&frame, Some(1)).error_code, ErrorCode::InvalidMessage);

        let garbage = [0x00, 0x01, 0x00, 0x01, 0x00, 0x10, 0x00, 0x03, 0xFE, 0xFE, 0xFE];
        assert_eq!(client.decode(&garbage, None).error_code, ErrorCode::Error);
    }

    #[test]
    fn test_low_level_aarq_carries_password() {
        let config = MeterConfiguration::builder().mr_password("4D52").build().unwrap();
        let mut client = DlmsClient::new(
            AssociationLevel::MeterReader,
            DLMS_NIC_ADDRESS,
            &config,
            NIC_CLIENT_SYSTEM_TITLE,
        );

        let frame = client.encode_aarq().unwrap();
        let (_, aarq) = AarqApdu::parse(&frame[8..]).unwrap();

        assert_eq!(aarq.application_context_name, ApplicationContextName::LogicalNameReferencing);
        assert_eq!(aarq.authentication, Authentication::Low);
        assert_eq!(aarq.calling_authentication_value, Some(vec![0x4D, 0x52]));
        assert_eq!(aarq.calling_ap_title, None);
    }

    #[test]
    fn test_low_level_aarq_without_password() {
        let mut client = DlmsClient::new(
            AssociationLevel::MeterReader,
            DLMS_NIC_ADDRESS,
            &MeterConfiguration::default(),
            NIC_CLIENT_SYSTEM_TITLE,
        );
        assert!(matches!(client.encode_aarq(), Err(Error::MissingPassword { .. })));
    }

    #[test]
    fn test_high_level_security_handshake() {
        let mut client = nic_client();
        let aarq_frame = client.encode_aarq().unwrap();
        let (_, aarq) = AarqApdu::parse(&aarq_frame[8..]).unwrap();
        assert_eq!(aarq.calling_ap_title, Some(NIC_CLIENT_SYSTEM_TITLE));
        assert_eq!(aarq.authentication, Authentication::High);
        let client_challenge = aarq.calling_authentication_value.unwrap();

        let server_challenge = b"P6wRJ21F".to_vec();
        let initiate = InitiateResponse::new(Conformance::CLIENT_LN, 0x01F4).encode();
        let keys = client.cipher.keys();
        let user_information = CipheredApdu::seal(
            &initiate,
            Security::AuthenticationEncryption,
            &SERVER_TITLE,
            1,
            keys,
        )
        .unwrap()
        .encode();
        let aare = AareApdu {
            application_context_name: ApplicationContextName::LogicalNameReferencingWithCiphering,
            result: AssociationResult::Accepted,
            result_source_diagnostic: SourceDiagnostic::ServiceUser(14),
            responding_ap_title: Some(SERVER_TITLE),
            mechanism_name: Some(Authentication::High),
            responding_authentication_value: Some(server_challenge.clone()),
            user_information: Some(user_information),
        };
        let mut fresh = nic_client();
        fresh.server_system_title = None;
        fresh.client_challenge = client.client_challenge.clone();
        fresh.parse_aare(&wrap(100, 48, &aare.encode())).unwrap();
        assert_eq!(fresh.server_system_title(), Some(SERVER_TITLE));

        let request_frame = fresh.encode_app_assoc_request().unwrap();
        assert_eq!(&request_frame[2..6], &[0x00, 0x30, 0x00, 0x64]);

        let password = b"Secret12";
        let reply = ActionResponse {
            invoke_id: 0xC0 | fresh.invoke_id(),
            result: ActionResult::Success,
            return_parameters: Some(GetDataResult::Data(Data::OctetString(
                hls::process_challenge(password, &client_challenge),
            ))),
        };
        let reply_frame = server_frame(&fresh, &reply.encode(), 2);
        fresh.parse_app_assoc_response(&reply_frame).unwrap();

        let forged = ActionResponse {
            return_parameters: Some(GetDataResult::Data(Data::OctetString(vec![0; 16]))),
            ..reply
        };
        let forged_frame = server_frame(&fresh, &forged.encode(), 3);
        assert!(fresh.parse_app_assoc_response(&forged_frame).is_err());
    }

    #[test]
    fn test_rejected_aare() {
        let mut client = nic_client();
        let aare = AareApdu {
            application_context_name: ApplicationContextName::LogicalNameReferencing,
            result: AssociationResult::RejectedPermanent,
            result_source_diagnostic: SourceDiagnostic::ServiceUser(13),
            responding_ap_title: None,
            mechanism_name: None,
            responding_authentication_value: None,
            user_information: None,
        };

        assert!(matches!(
            client.parse_aare(&wrap(100, 48, &aare.encode())),
            Err(Error::Association(_))
        ));
    }

    #[test]
    fn test_release_request() {
        let client = nic_client();
        assert_eq!(hex::encode(client.encode_release()), "00010030006400056203800100");
    }
}
