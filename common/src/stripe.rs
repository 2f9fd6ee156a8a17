use stripe::{Client, CreateCustomer, Customer, CustomerId};

use crate::error::{AppError, Res};

pub fn create_client(secret_key: &str) -> Client {
    Client::new(secret_key)
}

pub async fn create_customer(client: &Client, email: &str, user_id: &str) -> Res<Customer> {
    let metadata = std::collections::HashMap::from([("user_id".to_string(), user_id.to_string())]);
    let params = CreateCustomer {
        email: Some(email),
        metadata: Some(metadata),
        ..Default::default()
    };

    Customer::create(client, params)
        .await
        .map_err(AppError::from)
}

/// Retrieve customer object based on customer ID.
pub async fn get_customer(client: &Client, customer_id: &str) -> Res<Customer> {
    let id = parse_customer_id(customer_id)?;
    Customer::retrieve(client, &id, &[])
        .await
        .map_err(AppError::from)
}

pub fn parse_customer_id(customer_id: &str) -> Res<CustomerId> {
    customer_id.parse::<CustomerId>().map_err(|e| {
        AppError::Internal(format!(
            "Failed to parse customer id: {}. {}",
            customer_id, e
        ))
    })
}
