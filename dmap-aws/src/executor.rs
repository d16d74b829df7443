use crate::convert::{from_sdk_item, to_sdk_item, to_sdk_values};
use crate::error::{fault_from_sdk, AwsError, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::types::ReturnValue;
use aws_sdk_dynamodb::Client;
use dmap_core::executor::{
    DeleteItemInput, GetItemInput, GetItemOutput, PageOutput, PutItemInput, QueryInput, ScanInput,
    UpdateItemInput, UpdateItemOutput,
};
use dmap_core::{ClientConfig, Fault, RequestExecutor};
use tokio::runtime::Runtime;
use tracing::{debug, info};

type FaultResult<T> = std::result::Result<T, Fault>;

/// [`RequestExecutor`] issuing real DynamoDB requests.
///
/// Calls block on a runtime owned by the executor, so it must not be used
/// from inside another tokio runtime's worker threads.
pub struct AwsExecutor {
    client: Client,
    runtime: Runtime,
    page_size_hint: Option<usize>,
}

fn page_limit(limit: Option<usize>, hint: Option<usize>) -> FaultResult<Option<i32>> {
    limit
        .or(hint)
        .map(|l| {
            i32::try_from(l).map_err(|_| Fault::new("ValidationException", format!("Limit {} is out of range", l)))
        })
        .transpose()
}

impl AwsExecutor {
    /// Connects using the default credential chain.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate().map_err(AwsError::Config)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .load(),
        );
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(url) = &config.endpoint_url {
            builder = builder.endpoint_url(url);
        }
        info!(region = %config.region, endpoint = ?config.endpoint_url, "dynamodb executor ready");

        Ok(Self {
            client: Client::from_conf(builder.build()),
            runtime,
            page_size_hint: config.page_size_hint,
        })
    }

    /// Wraps an already configured client.
    pub fn from_client(client: Client) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        Ok(Self {
            client,
            runtime,
            page_size_hint: None,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl RequestExecutor for AwsExecutor {
    fn get_item(&self, input: GetItemInput) -> FaultResult<GetItemOutput> {
        debug!(table = %input.table_name, "GetItem");
        let output = self
            .runtime
            .block_on(
                self.client
                    .get_item()
                    .table_name(input.table_name)
                    .set_key(Some(to_sdk_item(&input.key)))
                    .send(),
            )
            .map_err(fault_from_sdk)?;
        Ok(GetItemOutput {
            item: output.item().map(from_sdk_item).transpose()?,
        })
    }

    fn put_item(&self, input: PutItemInput) -> FaultResult<()> {
        debug!(table = %input.table_name, condition = ?input.condition_expression, "PutItem");
        self.runtime
            .block_on(
                self.client
                    .put_item()
                    .table_name(input.table_name)
                    .set_item(Some(to_sdk_item(&input.item)))
                    .set_condition_expression(input.condition_expression)
                    .set_expression_attribute_names(input.names)
                    .set_expression_attribute_values(to_sdk_values(input.values))
                    .send(),
            )
            .map_err(fault_from_sdk)?;
        Ok(())
    }

    fn delete_item(&self, input: DeleteItemInput) -> FaultResult<()> {
        debug!(table = %input.table_name, condition = ?input.condition_expression, "DeleteItem");
        self.runtime
            .block_on(
                self.client
                    .delete_item()
                    .table_name(input.table_name)
                    .set_key(Some(to_sdk_item(&input.key)))
                    .set_condition_expression(input.condition_expression)
                    .set_expression_attribute_names(input.names)
                    .set_expression_attribute_values(to_sdk_values(input.values))
                    .send(),
            )
            .map_err(fault_from_sdk)?;
        Ok(())
    }

    fn update_item(&self, input: UpdateItemInput) -> FaultResult<UpdateItemOutput> {
        debug!(table = %input.table_name, update = %input.update_expression, "UpdateItem");
        let output = self
            .runtime
            .block_on(
                self.client
                    .update_item()
                    .table_name(input.table_name)
                    .set_key(Some(to_sdk_item(&input.key)))
                    .update_expression(input.update_expression)
                    .set_condition_expression(input.condition_expression)
                    .set_expression_attribute_names(input.names)
                    .set_expression_attribute_values(to_sdk_values(input.values))
                    .set_return_values(input.return_values.map(|r| ReturnValue::from(r.as_str())))
                    .send(),
            )
            .map_err(fault_from_sdk)?;
        Ok(UpdateItemOutput {
            attributes: output.attributes().map(from_sdk_item).transpose()?,
        })
    }

    fn query(&self, input: QueryInput) -> FaultResult<PageOutput> {
        debug!(table = %input.table_name, index = ?input.index_name, key_condition = %input.key_condition_expression, "Query");
        let limit = page_limit(input.limit, self.page_size_hint)?;
        let output = self
            .runtime
            .block_on(
                self.client
                    .query()
                    .table_name(input.table_name)
                    .set_index_name(input.index_name)
                    .key_condition_expression(input.key_condition_expression)
                    .set_filter_expression(input.filter_expression)
                    .set_expression_attribute_names(input.names)
                    .set_expression_attribute_values(to_sdk_values(input.values))
                    .set_limit(limit)
                    .scan_index_forward(input.scan_index_forward)
                    .set_exclusive_start_key(input.exclusive_start_key.as_ref().map(to_sdk_item))
                    .send(),
            )
            .map_err(fault_from_sdk)?;
        Ok(PageOutput {
            items: output.items().iter().map(from_sdk_item).collect::<FaultResult<_>>()?,
            last_evaluated_key: output.last_evaluated_key().map(from_sdk_item).transpose()?,
        })
    }

    fn scan(&self, input: ScanInput) -> FaultResult<PageOutput> {
        debug!(table = %input.table_name, index = ?input.index_name, "Scan");
        let limit = page_limit(input.limit, self.page_size_hint)?;
        let output = self
            .runtime
            .block_on(
                self.client
                    .scan()
                    .table_name(input.table_name)
                    .set_index_name(input.index_name)
                    .set_filter_expression(input.filter_expression)
                    .set_expression_attribute_names(input.names)
                    .set_expression_attribute_values(to_sdk_values(input.values))
                    .set_limit(limit)
                    .set_exclusive_start_key(input.exclusive_start_key.as_ref().map(to_sdk_item))
                    .send(),
            )
            .map_err(fault_from_sdk)?;
        Ok(PageOutput {
            items: output.items().iter().map(from_sdk_item).collect::<FaultResult<_>>()?,
            last_evaluated_key: output.last_evaluated_key().map(from_sdk_item).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_limit_prefers_explicit_limit() {
        assert_eq!(page_limit(Some(5), Some(100)).unwrap(), Some(5));
        assert_eq!(page_limit(None, Some(100)).unwrap(), Some(100));
        assert_eq!(page_limit(None, None).unwrap(), None);
        assert!(page_limit(Some(usize::MAX), None).is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ClientConfig::new().with_region("").with_endpoint_url("http://localhost:8000");
        assert!(matches!(AwsExecutor::new(config), Err(AwsError::Config(_))));
    }
}
