use std::fmt;

use crate::action::ActionResult;
use crate::apdu::Apdu;
use crate::association::AssociationResult;
use crate::client::DlmsClient;
use crate::data::{Data, DateTime};
use crate::exception::{ConfirmedServiceError, ExceptionResponse};
use crate::get::DataAccessResult;
use crate::translator::Translation;
use crate::wrapper::MIN_FRAME_LENGTH;

/// Failure reported by the remote side in a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    DataAccess(DataAccessResult),
    Action(ActionResult),
    Confirmed(ConfirmedServiceError),
    Exception(ExceptionResponse),
    AssociationRejected(AssociationResult),
}

impl ServiceError {
    fn of(apdu: &Apdu) -> Option<Self> {
        match apdu {
            Apdu::GetResponse(response) => response.access_error().map(Self::DataAccess),
            Apdu::SetResponse(response) => response.access_error().map(Self::DataAccess),
            Apdu::ActionResponse(response) if response.result != ActionResult::Success => {
                Some(Self::Action(response.result))
            }
            Apdu::ActionResponse(response) => response
                .return_error()
                .filter(|error| *error != DataAccessResult::Success)
                .map(Self::DataAccess),
            Apdu::ConfirmedServiceError(error) => Some(Self::Confirmed(*error)),
            Apdu::ExceptionResponse(exception) => Some(Self::Exception(*exception)),
            Apdu::Aare(aare) if !aare.is_accepted() => Some(Self::AssociationRejected(aare.result)),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::DataAccess(result) => write!(f, "data access result {result:?}"),
            ServiceError::Action(result) => write!(f, "action result {result:?}"),
            ServiceError::Confirmed(error) => {
                write!(f, "{} error {}", error.service_name(), error.value_name())
            }
            ServiceError::Exception(exception) => write!(
                f,
                "exception {:?} / {:?}",
                exception.state_error, exception.service_error
            ),
            ServiceError::AssociationRejected(result) => write!(f, "association {result}"),
        }
    }
}

/// Normalized view of a received wrapper frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    pub source: u16,
    pub target: u16,
    /// Invoke-id-and-priority of a response, or the long invoke-id of a data notification.
    pub invoke_id_and_priority: Option<u32>,
    pub service_error: Option<ServiceError>,
    pub value: Option<Data>,
    /// Date-time of a data notification header.
    pub date_time: Option<DateTime>,
    pub xml: String,
    /// Plaintext APDU, after opening any ciphered envelope.
    pub apdu: Option<Apdu>,
    pub payload: Vec<u8>,
}

impl ParsedFrame {
    /// Decode `payload` with the keys of `client`. `None` when it is not a DLMS
    /// frame the client can translate.
    pub fn from_payload(client: &DlmsClient, payload: &[u8]) -> Option<Self> {
        if payload.len() < MIN_FRAME_LENGTH {
            return None;
        }
        let translation = client.translator().translate(payload)?;
        Some(Self::from_translation(translation, payload))
    }

    pub(crate) fn from_translation(translation: Translation, payload: &[u8]) -> Self {
        let apdu = translation.apdu;
        let invoke_id_and_priority = apdu.as_ref().and_then(|apdu| match apdu {
            Apdu::DataNotification(notification) => Some(notification.invoke_id()),
            apdu => apdu.invoke_id().map(u32::from),
        });
        let value = apdu.as_ref().and_then(|apdu| match apdu {
            Apdu::GetResponse(response) => response.value(),
            Apdu::ActionResponse(response) => response.value(),
            Apdu::DataNotification(notification) => Some(notification.notification_body.clone()),
            _ => None,
        });
        let date_time = match &apdu {
            Some(Apdu::DataNotification(notification)) => notification.date_time.clone(),
            _ => None,
        };

        Self {
            source: translation.header.source,
            target: translation.header.target,
            invoke_id_and_priority,
            service_error: apdu.as_ref().and_then(ServiceError::of),
            value,
            date_time,
            xml: translation.xml,
            apdu,
            payload: payload.to_vec(),
        }
    }

    pub fn is_data_notification(&self) -> bool {
        matches!(self.apdu, Some(Apdu::DataNotification(_)))
    }
}

impl fmt::Display for ParsedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)?;
        if let Some(invoke_id) = self.invoke_id_and_priority {
            write!(f, " invoke {invoke_id:#X}")?;
        }
        if let Some(error) = &self.service_error {
            write!(f, " error: {error}")?;
        }
        if let Some(value) = &self.value {
            write!(f, " {value:?}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association_level::AssociationLevel;
    use crate::client::{DLMS_METER_ADDRESS, NIC_CLIENT_SYSTEM_TITLE};
    use crate::config::MeterConfiguration;
    use crate::data_notification::DataNotification;
    use crate::get::{GetDataResult, GetResponse};
    use crate::wrapper::wrap;

    fn client() -> DlmsClient {
        DlmsClient::new(
            AssociationLevel::PublicClient,
            DLMS_METER_ADDRESS,
            &MeterConfiguration::default(),
            NIC_CLIENT_SYSTEM_TITLE,
        )
    }

    #[test]
    fn test_short_frames_are_not_dlms() {
        let frame = [0x00, 0x01, 0x00, 0x01, 0x00, 0x10, 0x00, 0x02, 0xC4, 0x01];
        assert_eq!(ParsedFrame::from_payload(&client(), &frame), None);
    }

    #[test]
    fn test_response_frame() {
        let response = GetResponse::Normal {
            invoke_id: 0xC5,
            result: GetDataResult::DataAccessError(DataAccessResult::ObjectUndefined),
        };
        let frame = wrap(1, 16, &response.encode());

        let parsed = ParsedFrame::from_payload(&client(), &frame).unwrap();

        assert_eq!((parsed.source, parsed.target), (1, 16));
        assert_eq!(parsed.invoke_id_and_priority, Some(0xC5));
        assert_eq!(
            parsed.service_error,
            Some(ServiceError::DataAccess(DataAccessResult::ObjectUndefined))
        );
        assert_eq!(parsed.value, None);
        assert!(!parsed.is_data_notification());
    }

    #[test]
    fn test_data_notification_frame() {
        let body = Data::Structure(vec![Data::LongUnsigned(900)]);
        let notification = DataNotification::new(7, None, body.clone());
        let frame = wrap(100, 64, &notification.encode());

        let parsed = ParsedFrame::from_payload(&client(), &frame).unwrap();

        assert!(parsed.is_data_notification());
        assert_eq!(parsed.invoke_id_and_priority, Some(7));
        assert_eq!(parsed.value, Some(body));
        assert_eq!(parsed.service_error, None);
        assert!(parsed.xml.contains("<DataNotification>"));
    }
}
