//! XML rendering of wrapper frames for operators
//!
//! The rendering follows the element names of the DLMS XML translator in wide
//! use (`<GetResponse>`, `<glo_GetResponse>`, `<AssociationResponse>` ...).
//! Ciphered APDUs are opened with the keys handed to [`Translator::new`]:
//!
//! - opened envelopes are followed by a `<!--Decrypted data: ... -->` comment
//! - envelopes that could not be authenticated carry no comment at all
//! - malformed envelopes are followed by `<!--Failed to decrypt data.-->`
//!
//! Along with the text, [`Translation`] keeps the decoded APDUs so that callers
//! classify a frame without scanning the XML.

use std::fmt::{self, Write};

use crate::action::ActionResult;
use crate::apdu::Apdu;
use crate::association::AareApdu;
use crate::ciphering::{
    CipherError, CipherKeys, CipheredApdu, GENERAL_DED_CIPHERING, GENERAL_GLO_CIPHERING,
    is_dedicated_tag, plain_tag_for,
};
use crate::data::Data;
use crate::get::{DataAccessResult, GetDataResult, GetResponse};
use crate::set::SetResponse;
use crate::wrapper::{WrapperFrame, WrapperHeader};

/// Tail of the release request frame that some meters send with a trailing
/// release reason, rendered without decoding.
const RELEASE_REQUEST_SUFFIX: &str = "620380010003800100";
const RELEASE_REQUEST_FRAME_HEX_LENGTH: usize = 34;

/// Why a frame decoded only partially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationFailure {
    Deciphering(CipherError),
    /// An envelope opened to something that is not an APDU.
    InvalidApdu,
    /// A data block that is not the single, last block of the transfer.
    IncompleteBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub header: WrapperHeader,
    pub xml: String,
    /// Plaintext APDU, after opening any ciphered envelope.
    pub apdu: Option<Apdu>,
    /// Plaintext content of an AARE user-information field.
    pub user_information: Option<Apdu>,
    pub ciphered: bool,
    pub failure: Option<TranslationFailure>,
}

/// Renders frames exchanged with one logical device.
#[derive(Clone, Copy)]
pub struct Translator<'a> {
    keys: CipherKeys<'a>,
    dedicated_key: Option<&'a [u8; 16]>,
    /// Sender system title for envelopes that do not carry one.
    system_title: Option<&'a [u8; 8]>,
}

impl<'a> Translator<'a> {
    pub fn new(
        keys: CipherKeys<'a>,
        dedicated_key: Option<&'a [u8; 16]>,
        system_title: Option<&'a [u8; 8]>,
    ) -> Self {
        Self { keys, dedicated_key, system_title }
    }

    /// A translator without any key material, for plaintext frames.
    pub fn plain() -> Self {
        Self::new(CipherKeys { block_cipher_key: None, authentication_key: None }, None, None)
    }

    /// XML text of `frame`, `None` when it is not a wrapper frame holding a known APDU.
    pub fn frame_to_xml(&self, frame: &[u8]) -> Option<String> {
        self.translate(frame).map(|translation| translation.xml)
    }

    pub fn translate(&self, frame: &[u8]) -> Option<Translation> {
        if let Some(xml) = release_request_xml(frame) {
            let (_, header) = WrapperHeader::parse(frame).ok()?;
            return Some(Translation {
                header,
                xml,
                apdu: Some(Apdu::ReleaseRequest(crate::association::ReleaseRequest::normal())),
                user_information: None,
                ciphered: false,
                failure: None,
            });
        }

        let (_, frame) = WrapperFrame::parse(frame).ok()?;
        let (_, apdu) = Apdu::parse(&frame.apdu).ok()?;

        let mut writer = XmlWriter::default();
        writer.open_with(
            "WRAPPER",
            "len",
            &frame.header.length.to_string(),
        );
        writer.value("TargetAddress", format!("{:04X}", frame.header.target));
        writer.value("SourceAddress", format!("{:04X}", frame.header.source));
        writer.open("PDU");

        let mut translation = Translation {
            header: frame.header,
            xml: String::new(),
            apdu: None,
            user_information: None,
            ciphered: false,
            failure: None,
        };
        self.write_apdu(&mut writer, apdu, &mut translation);

        writer.close("PDU");
        writer.close("WRAPPER");
        translation.xml = writer.finish();
        Some(translation)
    }

    fn write_apdu(&self, w: &mut XmlWriter, apdu: Apdu, translation: &mut Translation) {
        match apdu {
            Apdu::Ciphered(ciphered) => {
                translation.ciphered = true;
                w.value(&ciphered_name(ciphered.tag), envelope_hex(&ciphered));
                match self.open(&ciphered) {
                    Ok(plaintext) => match Apdu::parse(&plaintext) {
                        Ok((_, inner)) => {
                            w.comment_start("Decrypted data:");
                            self.write_apdu(w, inner, translation);
                            w.comment_end();
                        }
                        Err(_) => {
                            w.comment("Decrypted data:");
                            w.comment(&format!("Invalid data: {}", hex::encode_upper(&plaintext)));
                            translation.failure = Some(TranslationFailure::InvalidApdu);
                        }
                    },
                    Err(error @ (CipherError::TagMismatch | CipherError::MissingKey(_))) => {
                        translation.failure = Some(TranslationFailure::Deciphering(error));
                    }
                    Err(error) => {
                        w.comment("Failed to decrypt data.");
                        translation.failure = Some(TranslationFailure::Deciphering(error));
                    }
                }
            }
            Apdu::Aare(aare) => {
                write_aare(w, &aare);
                if let Some(info) = &aare.user_information {
                    w.open("UserInformation");
                    match Apdu::parse(info) {
                        Ok((_, inner)) => {
                            // glo-initiate-response is protected under the title announced here
                            let system_title =
                                aare.responding_ap_title.as_ref().or(self.system_title);
                            let translator = Translator {
                                keys: self.keys,
                                dedicated_key: self.dedicated_key,
                                system_title,
                            };
                            let mut nested = Translation { apdu: None, ..translation.clone() };
                            translator.write_apdu(w, inner, &mut nested);
                            translation.ciphered |= nested.ciphered;
                            translation.failure = nested.failure.or(translation.failure.take());
                            translation.user_information = nested.apdu;
                        }
                        Err(_) => w.comment(&format!("Invalid data: {}", hex::encode_upper(info))),
                    }
                    w.close("UserInformation");
                }
                w.close("AssociationResponse");
                translation.apdu = Some(Apdu::Aare(aare));
            }
            apdu => {
                if let Apdu::GetResponse(GetResponse::WithDataBlock {
                    last_block, block_number, ..
                }) = &apdu
                {
                    if !(*last_block && *block_number == 1) {
                        translation.failure = Some(TranslationFailure::IncompleteBlock);
                    }
                }
                write_plain(w, &apdu);
                translation.apdu = Some(apdu);
            }
        }
    }

    fn open(&self, ciphered: &CipheredApdu) -> Result<Vec<u8>, CipherError> {
        let system_title = ciphered
            .system_title
            .as_ref()
            .or(self.system_title)
            .ok_or(CipherError::MissingKey("system title"))?;

        let keys = if is_dedicated_tag(ciphered.tag) {
            CipherKeys { block_cipher_key: self.dedicated_key, ..self.keys }
        } else {
            self.keys
        };
        ciphered.open(system_title, keys)
    }
}

/// Deterministic rendering of the release request frame that the generic
/// translation refuses.
pub fn release_request_xml(frame: &[u8]) -> Option<String> {
    let hex = hex::encode(frame);
    if hex.len() != RELEASE_REQUEST_FRAME_HEX_LENGTH || !hex.ends_with(RELEASE_REQUEST_SUFFIX) {
        return None;
    }

    let length = u16::from_str_radix(&hex[12..16], 16).ok()?;
    Some(format!(
        "<WRAPPER len=\"{length}\" >\n\
         <TargetAddress Value=\"{}\" />\n\
         <SourceAddress Value=\"{}\" />\n\
         <PDU>\n\
         <ReleaseRequest>\n  \
         <Reason Value=\"Normal\" />\n  \
         </ReleaseRequest>\n\
         </PDU>\n\
         </WRAPPER>",
        &hex[4..8],
        &hex[8..12],
    ))
}

/// Security header and information of an envelope, as shown in its `Value`.
fn envelope_hex(ciphered: &CipheredApdu) -> String {
    format!(
        "{:02X}{:08X}{}",
        ciphered.security_control.byte(),
        ciphered.invocation_counter,
        hex::encode_upper(&ciphered.information)
    )
}

fn ciphered_name(tag: u8) -> String {
    match tag {
        GENERAL_GLO_CIPHERING => "GeneralGloCiphering".to_string(),
        GENERAL_DED_CIPHERING => "GeneralDedCiphering".to_string(),
        tag => {
            let prefix = if is_dedicated_tag(tag) { "ded_" } else { "glo_" };
            let name = plain_tag_for(tag).map(apdu_name).unwrap_or("Unknown");
            format!("{prefix}{name}")
        }
    }
}

fn apdu_name(tag: u8) -> &'static str {
    match tag {
        0x01 => "InitiateRequest",
        0x08 => "InitiateResponse",
        0xC0 => "GetRequest",
        0xC1 => "SetRequest",
        0xC3 => "ActionRequest",
        0xC4 => "GetResponse",
        0xC5 => "SetResponse",
        0xC7 => "ActionResponse",
        _ => "Unknown",
    }
}

fn write_aare(w: &mut XmlWriter, aare: &AareApdu) {
    w.open("AssociationResponse");
    w.value("ApplicationContextName", aare.application_context_name);
    w.value("AssociationResult", format!("{:02X}", aare.result as u8));
    match aare.result_source_diagnostic {
        crate::association::SourceDiagnostic::ServiceUser(value) => {
            w.open("ResultSourceDiagnostic");
            w.value("ACSEServiceUser", format!("{value:02X}"));
            w.close("ResultSourceDiagnostic");
        }
        crate::association::SourceDiagnostic::ServiceProvider(value) => {
            w.open("ResultSourceDiagnostic");
            w.value("ACSEServiceProvider", format!("{value:02X}"));
            w.close("ResultSourceDiagnostic");
        }
    }
    if let Some(title) = &aare.responding_ap_title {
        w.value("RespondingAPTitle", hex::encode_upper(title));
    }
    if let Some(mechanism) = aare.mechanism_name {
        w.value("MechanismName", mechanism);
    }
    if let Some(challenge) = &aare.responding_authentication_value {
        w.value("RespondingAuthentication", hex::encode_upper(challenge));
    }
}

fn write_plain(w: &mut XmlWriter, apdu: &Apdu) {
    match apdu {
        Apdu::InitiateRequest(request) => {
            w.open("InitiateRequest");
            if let Some(key) = &request.dedicated_key {
                w.value("DedicatedKey", hex::encode_upper(key));
            }
            w.value("ProposedConformance", format!("{:06X}", request.proposed_conformance.bits()));
            w.value("ProposedMaxPduSize", format!("{:04X}", request.client_max_receive_pdu_size));
            w.close("InitiateRequest");
        }
        Apdu::InitiateResponse(response) => {
            w.open("InitiateResponse");
            let version = response.negotiated_dlms_version_number;
            w.value("NegotiatedDlmsVersionNumber", format!("{version:02X}"));
            let conformance = response.negotiated_conformance.bits();
            w.value("NegotiatedConformance", format!("{conformance:06X}"));
            let max_pdu_size = response.server_max_receive_pdu_size;
            w.value("NegotiatedMaxPduSize", format!("{max_pdu_size:04X}"));
            w.value("VaaName", format!("{:04X}", response.vaa_name));
            w.close("InitiateResponse");
        }
        Apdu::ConfirmedServiceError(error) => {
            w.open("ConfirmedServiceError");
            w.open(error.service_name());
            w.value(&format!("{:?}", error.kind), error.value_name());
            w.close(error.service_name());
            w.close("ConfirmedServiceError");
        }
        Apdu::ExceptionResponse(exception) => {
            w.open("ExceptionResponse");
            w.value("StateError", format!("{:?}", exception.state_error));
            w.value("ServiceError", format!("{:?}", exception.service_error));
            if let Some(counter) = exception.invocation_counter {
                w.value("InvocationCounter", format!("{counter:08X}"));
            }
            w.close("ExceptionResponse");
        }
        Apdu::DataNotification(notification) => {
            w.open("DataNotification");
            w.value(
                "LongInvokeIdAndPriority",
                format!("{:08X}", notification.long_invoke_id_and_priority.0),
            );
            match &notification.date_time {
                Some(date_time) => w.value("DateTime", hex::encode_upper(date_time.encode())),
                None => w.value("DateTime", ""),
            }
            w.open("NotificationBody");
            w.open("DataValue");
            write_data(w, &notification.notification_body);
            w.close("DataValue");
            w.close("NotificationBody");
            w.close("DataNotification");
        }
        Apdu::Aarq(aarq) => {
            w.open("AssociationRequest");
            w.value("ApplicationContextName", aarq.application_context_name);
            if let Some(title) = &aarq.calling_ap_title {
                w.value("CallingAPTitle", hex::encode_upper(title));
            }
            w.value("MechanismName", aarq.authentication);
            if aarq.calling_authentication_value.is_some() {
                w.value("CallingAuthentication", "********");
            }
            w.value("InitiateRequest", hex::encode_upper(&aarq.user_information));
            w.close("AssociationRequest");
        }
        Apdu::Aare(aare) => {
            write_aare(w, aare);
            w.close("AssociationResponse");
        }
        Apdu::ReleaseRequest(request) => {
            w.open("ReleaseRequest");
            if let Some(reason) = request.reason {
                w.value("Reason", format!("{reason:?}"));
            }
            w.close("ReleaseRequest");
        }
        Apdu::ReleaseResponse(response) => {
            w.open("ReleaseResponse");
            if let Some(reason) = response.reason {
                w.value("Reason", format!("{reason:?}"));
            }
            w.close("ReleaseResponse");
        }
        Apdu::GetRequest { invoke_id, attribute } => {
            w.open("GetRequest");
            w.open("GetRequestNormal");
            w.value("InvokeIdAndPriority", format!("{invoke_id:02X}"));
            write_descriptor(
                w,
                "AttributeDescriptor",
                attribute.class_id,
                attribute.instance_id,
                attribute.attribute_id,
            );
            w.close("GetRequestNormal");
            w.close("GetRequest");
        }
        Apdu::SetRequest { invoke_id, attribute } => {
            w.open("SetRequest");
            w.value("InvokeIdAndPriority", format!("{invoke_id:02X}"));
            if let Some(attribute) = attribute {
                write_descriptor(
                    w,
                    "AttributeDescriptor",
                    attribute.class_id,
                    attribute.instance_id,
                    attribute.attribute_id,
                );
            }
            w.close("SetRequest");
        }
        Apdu::ActionRequest { invoke_id, method } => {
            w.open("ActionRequest");
            w.open("ActionRequestNormal");
            w.value("InvokeIdAndPriority", format!("{invoke_id:02X}"));
            write_descriptor(
                w,
                "MethodDescriptor",
                method.class_id,
                method.instance_id,
                method.method_id,
            );
            w.close("ActionRequestNormal");
            w.close("ActionRequest");
        }
        Apdu::GetResponse(response) => write_get_response(w, response),
        Apdu::SetResponse(response) => write_set_response(w, response),
        Apdu::ActionResponse(response) => {
            w.open("ActionResponse");
            w.open("ActionResponseNormal");
            w.value("InvokeIdAndPriority", format!("{:02X}", response.invoke_id));
            w.open("Result");
            w.value("Result", action_result_name(response.result));
            if let Some(parameters) = &response.return_parameters {
                w.open("ReturnParameters");
                write_get_data_result(w, parameters);
                w.close("ReturnParameters");
            }
            w.close("Result");
            w.close("ActionResponseNormal");
            w.close("ActionResponse");
        }
        Apdu::Ciphered(ciphered) => {
            w.value(&ciphered_name(ciphered.tag), envelope_hex(&ciphered));
        }
    }
}

fn write_descriptor(
    w: &mut XmlWriter,
    name: &str,
    class_id: u16,
    instance: crate::ObisCode,
    index: i8,
) {
    w.open(name);
    w.value("ClassId", format!("{class_id:04X}"));
    w.value("InstanceId", hex::encode_upper(instance.encode()));
    let index_name = if name == "MethodDescriptor" { "MethodId" } else { "AttributeId" };
    w.value(index_name, format!("{:02X}", index as u8));
    w.close(name);
}

fn write_get_response(w: &mut XmlWriter, response: &GetResponse) {
    w.open("GetResponse");
    match response {
        GetResponse::Normal { invoke_id, result } => {
            w.open("GetResponseNormal");
            w.value("InvokeIdAndPriority", format!("{invoke_id:02X}"));
            w.open("Result");
            write_get_data_result(w, result);
            w.close("Result");
            w.close("GetResponseNormal");
        }
        GetResponse::WithDataBlock { invoke_id, last_block, block_number, raw_data } => {
            w.open("GetResponsewithDataBlock");
            w.value("InvokeIdAndPriority", format!("{invoke_id:02X}"));
            w.open("Result");
            w.value("LastBlock", format!("{:02X}", *last_block as u8));
            w.value("BlockNumber", format!("{block_number:08X}"));
            match raw_data {
                Ok(raw) => w.value("RawData", hex::encode_upper(raw)),
                Err(result) => w.value("DataAccessResult", access_result_name(*result)),
            }
            w.close("Result");
            w.close("GetResponsewithDataBlock");
            if !(*last_block && *block_number == 1) {
                w.comment("Block is not complete.");
            }
        }
        GetResponse::WithList { invoke_id, results } => {
            w.open("GetResponseWithList");
            w.value("InvokeIdAndPriority", format!("{invoke_id:02X}"));
            w.open_with("Result", "Qty", &format!("{:02X}", results.len()));
            for result in results {
                write_get_data_result(w, result);
            }
            w.close("Result");
            w.close("GetResponseWithList");
        }
    }
    w.close("GetResponse");
}

fn write_set_response(w: &mut XmlWriter, response: &SetResponse) {
    w.open("SetResponse");
    match response {
        SetResponse::Normal { invoke_id, result } => {
            w.open("SetResponseNormal");
            w.value("InvokeIdAndPriority", format!("{invoke_id:02X}"));
            w.value("Result", access_result_name(*result));
            w.close("SetResponseNormal");
        }
        SetResponse::DataBlock { invoke_id, block_number } => {
            w.open("SetResponseDataBlock");
            w.value("InvokeIdAndPriority", format!("{invoke_id:02X}"));
            w.value("BlockNumber", format!("{block_number:08X}"));
            w.close("SetResponseDataBlock");
        }
        SetResponse::LastDataBlock { invoke_id, result, block_number } => {
            w.open("SetResponseLastDataBlock");
            w.value("InvokeIdAndPriority", format!("{invoke_id:02X}"));
            w.value("Result", access_result_name(*result));
            w.value("BlockNumber", format!("{block_number:08X}"));
            w.close("SetResponseLastDataBlock");
        }
        SetResponse::WithList { invoke_id, results } => {
            w.open("SetResponseWithList");
            w.value("InvokeIdAndPriority", format!("{invoke_id:02X}"));
            w.open_with("Result", "Qty", &format!("{:02X}", results.len()));
            for result in results {
                w.value("DataAccessResult", access_result_name(*result));
            }
            w.close("Result");
            w.close("SetResponseWithList");
        }
    }
    w.close("SetResponse");
}

fn write_get_data_result(w: &mut XmlWriter, result: &GetDataResult) {
    match result {
        GetDataResult::Data(data) => {
            w.open("Data");
            write_data(w, data);
            w.close("Data");
        }
        GetDataResult::DataAccessError(error) => {
            w.value("DataAccessError", access_result_name(*error));
        }
    }
}

fn access_result_name(result: DataAccessResult) -> String {
    format!("{result:?}")
}

fn action_result_name(result: ActionResult) -> String {
    format!("{result:?}")
}

fn write_data(w: &mut XmlWriter, data: &Data) {
    match data {
        Data::Null => w.empty("Null"),
        Data::Array(items) | Data::Structure(items) => {
            let name = if matches!(data, Data::Array(_)) { "Array" } else { "Structure" };
            w.open_with(name, "Qty", &format!("{:02X}", items.len()));
            for item in items {
                write_data(w, item);
            }
            w.close(name);
        }
        Data::Bool(value) => w.value("Boolean", value),
        Data::BitString(bits) => w.value("BitString", bits),
        Data::DoubleLong(value) => w.value("Int32", format!("{value:08X}")),
        Data::DoubleLongUnsigned(value) => w.value("UInt32", format!("{value:08X}")),
        Data::OctetString(bytes) => w.value("OctetString", hex::encode_upper(bytes)),
        Data::VisibleString(bytes) => w.value("String", String::from_utf8_lossy(bytes)),
        Data::Utf8String(text) => w.value("Utf8String", text),
        Data::Integer(value) => w.value("Int8", format!("{value:02X}")),
        Data::Long(value) => w.value("Int16", format!("{value:04X}")),
        Data::Unsigned(value) => w.value("UInt8", format!("{value:02X}")),
        Data::LongUnsigned(value) => w.value("UInt16", format!("{value:04X}")),
        Data::Long64(value) => w.value("Int64", format!("{value:016X}")),
        Data::Long64Unsigned(value) => w.value("UInt64", format!("{value:016X}")),
        Data::Enum(value) => w.value("Enum", format!("{value:02X}")),
        Data::Float32(value) => w.value("Float32", value),
        Data::Float64(value) => w.value("Float64", value),
        Data::DateTime(value) => w.value("DateTime", hex::encode_upper(value.encode())),
        Data::Date(value) => w.value("Date", hex::encode_upper(value.encode())),
        Data::Time(value) => w.value("Time", hex::encode_upper(value.encode())),
    }
}

/// Line oriented XML builder, two spaces per level.
#[derive(Default)]
struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    fn line(&mut self, args: fmt::Arguments<'_>) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        // Writing into a String cannot fail.
        let _ = self.out.write_fmt(args);
        self.out.push('\n');
    }

    fn open(&mut self, tag: &str) {
        self.line(format_args!("<{tag}>"));
        self.depth += 1;
    }

    fn open_with(&mut self, tag: &str, attribute: &str, value: &str) {
        self.line(format_args!("<{tag} {attribute}=\"{value}\" >"));
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(format_args!("</{tag}>"));
    }

    fn value(&mut self, tag: &str, value: impl fmt::Display) {
        self.line(format_args!("<{tag} Value=\"{value}\" />"));
    }

    fn empty(&mut self, tag: &str) {
        self.line(format_args!("<{tag} />"));
    }

    fn comment(&mut self, text: &str) {
        self.line(format_args!("<!--{text}-->"));
    }

    fn comment_start(&mut self, text: &str) {
        self.line(format_args!("<!--{text}"));
    }

    fn comment_end(&mut self) {
        self.line(format_args!("-->"));
    }

    fn finish(mut self) -> String {
        if self.out.ends_with('\n') {
            self.out.pop();
        }
        self.out
    }
}
