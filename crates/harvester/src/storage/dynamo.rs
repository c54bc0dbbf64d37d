//! DynamoDB-backed [`KeyValueStore`].

use std::collections::HashMap;

use aws_sdk_dynamodb::{
  error::DisplayErrorContext,
  types::{
    AttributeDefinition, AttributeValue, KeySchemaElement, KeyType as KeyRole,
    ProvisionedThroughput, ScalarAttributeType, TableStatus,
  },
  Client,
};

use super::*;

/// Read and write capacity units of created tables.
const PROVISIONED_CAPACITY: i64 = 10;

/// Maps any SDK error to a key-value store error, keeping the full cause chain.
fn store_error(context: &str, err: impl std::error::Error) -> HarvestError {
  HarvestError::KeyValueStore(format!("{context}: {}", DisplayErrorContext(err)))
}

impl From<KeyType> for ScalarAttributeType {
  fn from(key_type: KeyType) -> Self {
    match key_type {
      KeyType::Number => ScalarAttributeType::N,
      KeyType::String => ScalarAttributeType::S,
    }
  }
}

impl From<Attribute> for AttributeValue {
  fn from(attribute: Attribute) -> Self {
    match attribute {
      Attribute::S(s) => AttributeValue::S(s),
      Attribute::N(n) => AttributeValue::N(n),
      Attribute::Bool(b) => AttributeValue::Bool(b),
      Attribute::L(values) => AttributeValue::L(values.into_iter().map(Into::into).collect()),
      Attribute::M(map) => AttributeValue::M(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
      Attribute::Null => AttributeValue::Null(true),
    }
  }
}

/// A [`KeyValueStore`] on DynamoDB.
#[derive(Debug, Clone)]
pub struct DynamoStore {
  /// SDK client
  client: Client,
  /// Deadline for a table to become active or disappear
  wait:   Duration,
}

impl DynamoStore {
  /// Creates a store from a loaded AWS configuration.
  pub fn new(sdk_config: &aws_config::SdkConfig, wait: Duration) -> Self {
    Self { client: Client::new(sdk_config), wait }
  }

  /// Current status of a table, `None` once it no longer exists.
  async fn table_status(&self, table: &str) -> Result<Option<TableStatus>> {
    match self.client.describe_table().table_name(table).send().await {
      Ok(output) => Ok(output.table().and_then(|t| t.table_status()).cloned()),
      Err(err) if err.as_service_error().is_some_and(|e| e.is_resource_not_found_exception()) =>
        Ok(None),
      Err(err) => Err(store_error("describe table failed", err)),
    }
  }
}

#[async_trait]
impl KeyValueStore for DynamoStore {
  async fn list_tables(&self) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut start = None;
    loop {
      let output = self
        .client
        .list_tables()
        .set_exclusive_start_table_name(start.take())
        .send()
        .await
        .map_err(|e| store_error("list tables failed", e))?;
      names.extend(output.table_names().iter().cloned());
      match output.last_evaluated_table_name() {
        Some(last) => start = Some(last.to_string()),
        None => break,
      }
    }
    Ok(names)
  }

  async fn create_table(&self, table: &TableConfig) -> Result<()> {
    let mut keys = vec![(&table.primary_key, KeyRole::Hash)];
    if let Some(sort_key) = &table.sort_key {
      keys.push((sort_key, KeyRole::Range));
    }

    let mut definitions = Vec::with_capacity(keys.len());
    let mut schema = Vec::with_capacity(keys.len());
    for (key, role) in keys {
      definitions.push(
        AttributeDefinition::builder()
          .attribute_name(&key.name)
          .attribute_type(key.key_type.into())
          .build()
          .map_err(|e| store_error("invalid attribute definition", e))?,
      );
      schema.push(
        KeySchemaElement::builder()
          .attribute_name(&key.name)
          .key_type(role)
          .build()
          .map_err(|e| store_error("invalid key schema", e))?,
      );
    }
    let throughput = ProvisionedThroughput::builder()
      .read_capacity_units(PROVISIONED_CAPACITY)
      .write_capacity_units(PROVISIONED_CAPACITY)
      .build()
      .map_err(|e| store_error("invalid throughput", e))?;

    self
      .client
      .create_table()
      .table_name(&table.name)
      .set_attribute_definitions(Some(definitions))
      .set_key_schema(Some(schema))
      .provisioned_throughput(throughput)
      .send()
      .await
      .map_err(|e| store_error("create table failed", e))?;

    info!("Waiting for table {} to become active", table.name);
    poll_until(&format!("table {} to become active", table.name), self.wait, || async {
      self.table_status(&table.name).await.map(|status| status == Some(TableStatus::Active))
    })
    .await
  }

  async fn put_item(&self, table: &str, item: Item) -> Result<()> {
    let item: HashMap<String, AttributeValue> =
      item.into_iter().map(|(name, value)| (name, value.into())).collect();
    self
      .client
      .put_item()
      .table_name(table)
      .set_item(Some(item))
      .send()
      .await
      .map_err(|e| store_error("put item failed", e))?;
    Ok(())
  }

  async fn delete_item(&self, table: &str, key: &KeySchema, value: &str) -> Result<()> {
    let value = match key.key_type {
      KeyType::Number => AttributeValue::N(value.to_string()),
      KeyType::String => AttributeValue::S(value.to_string()),
    };
    self
      .client
      .delete_item()
      .table_name(table)
      .key(&key.name, value)
      .send()
      .await
      .map_err(|e| store_error("delete item failed", e))?;
    Ok(())
  }

  async fn delete_table(&self, table: &str) -> Result<()> {
    self
      .client
      .delete_table()
      .table_name(table)
      .send()
      .await
      .map_err(|e| store_error("delete table failed", e))?;

    poll_until(&format!("table {table} to be deleted"), self.wait, || async {
      self.table_status(table).await.map(|status| status.is_none())
    })
    .await
  }
}
