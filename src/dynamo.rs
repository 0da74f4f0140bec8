//! DynamoDB [`MetadataTable`] adapter.
//!
//! Speaks the DynamoDB JSON protocol directly (`Scan`, `GetItem`, `Query`)
//! and turns attribute-typed items into plain [`RawRecord`]s. There is no
//! write or delete path.

use anyhow::Result;
use async_trait::async_trait;
use metastream_core::backend::{MetadataTable, ScanPage, PARTITION_KEY, SORT_KEY};
use metastream_core::RawRecord;
use serde_json::{json, Map, Value};

use crate::aws::{AwsClient, JsonTarget};
use crate::config::AwsConfig;
use crate::sigv4::Endpoint;

const SERVICE: &str = "dynamodb";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

pub struct DynamoTable {
    client: AwsClient,
    table: String,
    endpoint: Endpoint,
}

impl DynamoTable {
    pub fn new(client: AwsClient, config: &AwsConfig) -> Self {
        let endpoint = Endpoint::resolve(
            config.dynamodb_endpoint_url.as_deref(),
            format!("dynamodb.{}.amazonaws.com", config.region),
        );
        Self {
            client,
            table: config.table.clone(),
            endpoint,
        }
    }

    async fn call(&self, operation: &str, payload: Value) -> Result<Value> {
        let target = format!("DynamoDB_20120810.{}", operation);
        self.client
            .call_json(
                &self.endpoint,
                &JsonTarget {
                    service: SERVICE,
                    target: &target,
                    content_type: CONTENT_TYPE,
                },
                &payload,
            )
            .await
    }
}

fn scan_request(table: &str, page_size: usize, token: Option<&Value>) -> Value {
    let mut req = json!({ "TableName": table, "Limit": page_size });
    if let Some(t) = token {
        req["ExclusiveStartKey"] = t.clone();
    }
    req
}

fn get_item_request(table: &str, primary: &str, sort: &str) -> Value {
    json!({
        "TableName": table,
        "Key": {
            PARTITION_KEY: { "S": primary },
            SORT_KEY: { "S": sort },
        },
    })
}

fn query_first_request(table: &str, primary: &str) -> Value {
    json!({
        "TableName": table,
        "KeyConditionExpression": format!("{} = :pk", PARTITION_KEY),
        "ExpressionAttributeValues": { ":pk": { "S": primary } },
        "Limit": 1,
    })
}

fn typed_items(resp: &Value) -> Vec<RawRecord> {
    resp.get("Items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(RawRecord::from_typed)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_scan_response(resp: &Value) -> ScanPage {
    let next_token = resp
        .get("LastEvaluatedKey")
        .filter(|v| v.as_object().is_some_and(|m| !m.is_empty()))
        .cloned();
    ScanPage {
        records: typed_items(resp),
        next_token,
    }
}

#[async_trait]
impl MetadataTable for DynamoTable {
    async fn scan_page(&self, page_size: usize, token: Option<&Value>) -> Result<ScanPage> {
        let resp = self
            .call("Scan", scan_request(&self.table, page_size, token))
            .await?;
        Ok(parse_scan_response(&resp))
    }

    async fn get_by_key(&self, primary: &str, sort: Option<&str>) -> Result<Option<RawRecord>> {
        match sort {
            Some(sort) => {
                let resp = self
                    .call("GetItem", get_item_request(&self.table, primary, sort))
                    .await?;
                Ok(resp
                    .get("Item")
                    .and_then(Value::as_object)
                    .filter(|m: &&Map<String, Value>| !m.is_empty())
                    .map(RawRecord::from_typed))
            }
            None => {
                let resp = self
                    .call("Query", query_first_request(&self.table, primary))
                    .await?;
                Ok(typed_items(&resp).into_iter().next())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_request_carries_token() {
        let req = scan_request("t", 200, None);
        assert_eq!(req, json!({"TableName": "t", "Limit": 200}));
        let token = json!({"FileName": {"S": "a.csv"}});
        let req = scan_request("t", 50, Some(&token));
        assert_eq!(req["ExclusiveStartKey"], token);
    }

    #[test]
    fn key_requests_use_table_schema() {
        let get = get_item_request("t", "a.csv", "a.csv#full");
        assert_eq!(get["Key"]["FileName"]["S"], "a.csv");
        assert_eq!(get["Key"]["RecordID"]["S"], "a.csv#full");

        let query = query_first_request("t", "a.csv");
        assert_eq!(query["KeyConditionExpression"], "FileName = :pk");
        assert_eq!(query["ExpressionAttributeValues"][":pk"]["S"], "a.csv");
        assert_eq!(query["Limit"], 1);
    }

    #[test]
    fn scan_response_unwraps_items() {
        let resp = json!({
            "Items": [
                {"FileName": {"S": "a.csv"}, "RowCount": {"N": "12"}},
                {"FileName": {"S": "b.csv"}, "Tags": {"L": [{"S": "x"}]}}
            ],
            "LastEvaluatedKey": {"FileName": {"S": "b.csv"}},
            "Count": 2
        });
        let page = parse_scan_response(&resp);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].get("RowCount"), Some(&json!(12)));
        assert_eq!(page.records[1].get("Tags"), Some(&json!(["x"])));
        assert_eq!(page.next_token, Some(json!({"FileName": {"S": "b.csv"}})));
    }

    #[test]
    fn exhausted_scan_has_no_token() {
        let page = parse_scan_response(&json!({"Items": [], "LastEvaluatedKey": {}}));
        assert!(page.records.is_empty());
        assert!(page.next_token.is_none());
        assert!(parse_scan_response(&json!({})).next_token.is_none());
    }
}
