//! Read command - ReadDataByIdentifier

use anyhow::Result;
use uds_client::uds::{CodedParameter, DataType, LengthEncoding, Termination};
use uds_client::UdsClient;

use super::parse_did;
use crate::output::{DataRow, OutputContext};

/// Read DIDs one by one and print their raw record
///
/// DIDs that already have a registered layout are decoded with it;
/// anything else is shown as a byte field covering the whole record.
pub async fn read(client: &UdsClient, dids: &[String], ctx: &OutputContext) -> Result<()> {
    let mut rows = Vec::with_capacity(dids.len());

    for input in dids {
        let did = parse_did(input)?;
        if !client.is_registered(did) {
            client.register_did(
                did,
                vec![Box::new(CodedParameter::new(
                    "raw",
                    DataType::ByteField,
                    LengthEncoding::MinMax {
                        min: 0,
                        max: None,
                        termination: Termination::EndOfPdu,
                    },
                ))],
            );
        }

        match client.read_data_by_identifier(&[did]).await {
            Ok(decoded) => {
                for (did, values) in decoded {
                    for (name, value) in values {
                        rows.push(DataRow {
                            did: format!("0x{:04X}", did),
                            parameter: name,
                            value: format_value(&value),
                        });
                    }
                }
            }
            Err(e) => rows.push(DataRow {
                did: format!("0x{:04X}", did),
                parameter: String::new(),
                value: format!("Error: {}", e),
            }),
        }
    }

    ctx.print(&rows);
    Ok(())
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
