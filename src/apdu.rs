//! Dispatch of received or sent xDLMS / ACSE APDUs on their first byte.

use nom::{
    IResult,
    error::{Error, ErrorKind},
};

use crate::action::{
    ACTION_REQUEST_TAG, ACTION_RESPONSE_TAG, ActionRequest, ActionResponse, MethodDescriptor,
};
use crate::association::{
    AARE_TAG, AARQ_TAG, AareApdu, AarqApdu, InitiateRequest, InitiateResponse, RLRE_TAG,
    RLRQ_TAG, ReleaseRequest, ReleaseResponse,
};
use crate::ciphering::{CipheredApdu, is_ciphered_tag};
use crate::data_notification::{DATA_NOTIFICATION_TAG, DataNotification};
use crate::exception::{
    CONFIRMED_SERVICE_ERROR_TAG, ConfirmedServiceError, EXCEPTION_RESPONSE_TAG, ExceptionResponse,
};
use crate::get::{
    AttributeDescriptor, DataAccessResult, GET_REQUEST_TAG, GET_RESPONSE_TAG, GetResponse,
    parse_request_descriptor,
};
use crate::set::{SET_REQUEST_TAG, SET_RESPONSE_TAG, SetResponse};

const INITIATE_REQUEST_TAG: u8 = 0x01;
const INITIATE_RESPONSE_TAG: u8 = 0x08;

#[derive(Debug, Clone, PartialEq)]
pub enum Apdu {
    InitiateRequest(InitiateRequest),
    InitiateResponse(InitiateResponse),
    ConfirmedServiceError(ConfirmedServiceError),
    DataNotification(DataNotification),
    Aarq(AarqApdu),
    Aare(AareApdu),
    ReleaseRequest(ReleaseRequest),
    ReleaseResponse(ReleaseResponse),
    /// Only the addressed attribute of a request is decoded.
    GetRequest { invoke_id: u8, attribute: AttributeDescriptor },
    SetRequest { invoke_id: u8, attribute: Option<AttributeDescriptor> },
    ActionRequest { invoke_id: u8, method: MethodDescriptor },
    GetResponse(GetResponse),
    SetResponse(SetResponse),
    ActionResponse(ActionResponse),
    ExceptionResponse(ExceptionResponse),
    Ciphered(CipheredApdu),
}

impl Apdu {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let Some(&tag) = input.first() else {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Eof)));
        };

        match tag {
            INITIATE_REQUEST_TAG => {
                InitiateRequest::parse(input).map(|(i, a)| (i, Self::InitiateRequest(a)))
            }
            INITIATE_RESPONSE_TAG => {
                InitiateResponse::parse(input).map(|(i, a)| (i, Self::InitiateResponse(a)))
            }
            CONFIRMED_SERVICE_ERROR_TAG => ConfirmedServiceError::parse(input)
                .map(|(i, a)| (i, Self::ConfirmedServiceError(a))),
            DATA_NOTIFICATION_TAG => {
                DataNotification::parse(input).map(|(i, a)| (i, Self::DataNotification(a)))
            }
            AARQ_TAG => AarqApdu::parse(input).map(|(i, a)| (i, Self::Aarq(a))),
            AARE_TAG => AareApdu::parse(input).map(|(i, a)| (i, Self::Aare(a))),
            RLRQ_TAG => ReleaseRequest::parse(input).map(|(i, a)| (i, Self::ReleaseRequest(a))),
            RLRE_TAG => ReleaseResponse::parse(input).map(|(i, a)| (i, Self::ReleaseResponse(a))),
            GET_REQUEST_TAG => {
                let invoke_id = input.get(2).copied().unwrap_or_default();
                parse_request_descriptor(input)
                    .map(|(i, attribute)| (i, Self::GetRequest { invoke_id, attribute }))
            }
            SET_REQUEST_TAG => {
                let invoke_id = input.get(2).copied().unwrap_or_default();
                // With-list requests carry several descriptors, none is singled out.
                let attribute = match input.get(1) {
                    Some(0x01) => parse_request_descriptor(input).ok().map(|(_, a)| a),
                    _ => None,
                };
                Ok((&input[input.len()..], Self::SetRequest { invoke_id, attribute }))
            }
            ACTION_REQUEST_TAG => {
                let invoke_id = input.get(2).copied().unwrap_or_default();
                ActionRequest::parse_descriptor(input)
                    .map(|(i, method)| (i, Self::ActionRequest { invoke_id, method }))
            }
            GET_RESPONSE_TAG => GetResponse::parse(input).map(|(i, a)| (i, Self::GetResponse(a))),
            SET_RESPONSE_TAG => SetResponse::parse(input).map(|(i, a)| (i, Self::SetResponse(a))),
            ACTION_RESPONSE_TAG => {
                ActionResponse::parse(input).map(|(i, a)| (i, Self::ActionResponse(a)))
            }
            EXCEPTION_RESPONSE_TAG => {
                ExceptionResponse::parse(input).map(|(i, a)| (i, Self::ExceptionResponse(a)))
            }
            tag if is_ciphered_tag(tag) => {
                CipheredApdu::parse(input).map(|(i, a)| (i, Self::Ciphered(a)))
            }
            _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
        }
    }

    /// Invoke-id-and-priority byte of a confirmed service, if the APDU has one.
    pub fn invoke_id(&self) -> Option<u8> {
        match self {
            Self::GetRequest { invoke_id, .. }
            | Self::SetRequest { invoke_id, .. }
            | Self::ActionRequest { invoke_id, .. } => Some(*invoke_id),
            Self::GetResponse(response) => Some(response.invoke_id()),
            Self::SetResponse(response) => Some(response.invoke_id()),
            Self::ActionResponse(response) => Some(response.invoke_id),
            _ => None,
        }
    }

    /// Whether the remote side reported a failure of the requested service.
    pub fn is_service_error(&self) -> bool {
        match self {
            Self::ConfirmedServiceError(_) | Self::ExceptionResponse(_) => true,
            Self::GetResponse(response) => response.access_error().is_some(),
            Self::SetResponse(response) => response.access_error().is_some(),
            Self::ActionResponse(response) => {
                response.result != crate::action::ActionResult::Success
                    || response.return_error().is_some_and(|e| e != DataAccessResult::Success)
            }
            Self::Aare(aare) => !aare.is_accepted(),
            _ => false,
        }
    }
}
