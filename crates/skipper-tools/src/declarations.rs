//! Tool schema advertised to the language model.

use serde::Serialize;
use serde_json::{json, Value};

pub const CHECK_YACHT_AVAILABILITY: &str = "check_yacht_availability";
pub const TRANSFER_TO_SUPPORT: &str = "transfer_to_support";
pub const SAVE_CLIENT_DATA: &str = "save_client_data";
pub const SEND_WHATSAPP_MESSAGE: &str = "send_whatsapp_message";
pub const SEND_CLOSING_PROCESS_INFO: &str = "send_closing_process_info";
pub const REQUEST_CANCELLATION: &str = "request_cancellation";
pub const SEND_BOOKING_CONFIRMATION: &str = "send_booking_confirmation";

/// A function the model may call; `parameters` is a JSON Schema object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Declarations for every tool [`crate::BookingTools`] implements.
pub fn tool_declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: CHECK_YACHT_AVAILABILITY,
            description: "Check free time slots for a yacht on a given date.",
            parameters: object(
                json!({
                    "date": {"type": "string", "description": "DD.MM.YYYY or YYYY-MM-DD"},
                    "duration": {"type": "number", "description": "Trip length in hours"},
                    "yachtName": {"type": "string"},
                }),
                &["date", "duration", "yachtName"],
            ),
        },
        ToolDeclaration {
            name: TRANSFER_TO_SUPPORT,
            description: "Transfer the caller to a human representative.",
            parameters: object(json!({}), &[]),
        },
        ToolDeclaration {
            name: SAVE_CLIENT_DATA,
            description: "Save the client's name and phone number.",
            parameters: object(
                json!({
                    "name": {"type": "string"},
                    "phone": {"type": "string"},
                }),
                &["name", "phone"],
            ),
        },
        ToolDeclaration {
            name: SEND_WHATSAPP_MESSAGE,
            description: "Send a WhatsApp message to the client.",
            parameters: object(
                json!({
                    "messageBody": {"type": "string"},
                    "clientPhone": {"type": "string"},
                }),
                &["messageBody", "clientPhone"],
            ),
        },
        ToolDeclaration {
            name: SEND_CLOSING_PROCESS_INFO,
            description: "Send the payment and reservation explanation. Use before booking.",
            parameters: object(
                json!({"clientPhone": {"type": "string"}}),
                &["clientPhone"],
            ),
        },
        ToolDeclaration {
            name: REQUEST_CANCELLATION,
            description: "Handle a booking cancellation request.",
            parameters: object(
                json!({
                    "orderId": {"type": "string"},
                    "clientPhone": {"type": "string"},
                }),
                &["orderId", "clientPhone"],
            ),
        },
        ToolDeclaration {
            name: SEND_BOOKING_CONFIRMATION,
            description: "Finalize a booking: calendar entry, confirmation and payment messages.",
            parameters: object(
                json!({
                    "clientName": {"type": "string"},
                    "clientPhone": {"type": "string"},
                    "date": {"type": "string"},
                    "startTime": {"type": "string", "description": "HH:MM"},
                    "duration": {"type": "number"},
                    "yachtName": {"type": "string"},
                    "participants": {"type": "string"},
                    "locationLink": {"type": "string"},
                    "locationDesc": {"type": "string"},
                    "totalPrice": {"type": "number"},
                    "paymentLink": {"type": "string"},
                    "guideLink": {"type": "string"},
                }),
                &[
                    "clientName",
                    "clientPhone",
                    "date",
                    "startTime",
                    "duration",
                    "yachtName",
                    "totalPrice",
                ],
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_names_are_unique() {
        let decls = tool_declarations();
        let mut names: Vec<_> = decls.iter().map(|d| d.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), decls.len());
    }

    #[test]
    fn required_fields_are_declared_properties() {
        for decl in tool_declarations() {
            let props = decl.parameters["properties"].as_object().unwrap();
            for required in decl.parameters["required"].as_array().unwrap() {
                let key = required.as_str().unwrap();
                assert!(props.contains_key(key), "{} missing {}", decl.name, key);
            }
        }
    }
}
