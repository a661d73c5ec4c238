//! get_financial_summary tool - balances and month-to-date cash flow from the financial service

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::HandlerError;

use super::{Handler, NoParams, empty_schema, parse_params};

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    balance: Option<f64>,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Per-type totals across active accounts
#[derive(Debug, Default, PartialEq)]
struct Balances {
    account_count: usize,
    totals_by_type: BTreeMap<String, f64>,
}

impl Balances {
    fn from_accounts(accounts: &[Account]) -> Self {
        let mut balances = Self::default();
        for account in accounts.iter().filter(|a| a.is_active) {
            balances.account_count += 1;
            let kind = account.kind.clone().unwrap_or_else(|| "Other".to_string());
            *balances.totals_by_type.entry(kind).or_insert(0.0) += account.balance.unwrap_or(0.0);
        }
        balances
    }

    fn net_worth(&self) -> f64 {
        self.totals_by_type.values().sum()
    }
}

/// The service returns either a bare array or `{"accounts": [...]}`.
fn parse_accounts(body: Value) -> Result<Vec<Account>, HandlerError> {
    let list = match body {
        Value::Array(_) => body,
        Value::Object(mut map) => map
            .remove("accounts")
            .filter(Value::is_array)
            .ok_or_else(|| HandlerError::MalformedOutput("accounts response has no `accounts` array".to_string()))?,
        other => {
            return Err(HandlerError::MalformedOutput(format!(
                "unexpected accounts response: {}",
                other
            )));
        }
    };
    serde_json::from_value(list).map_err(|e| HandlerError::MalformedOutput(format!("accounts: {}", e)))
}

fn first_of_month(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

pub struct FinancialSummaryTool {
    config: Arc<Config>,
}

impl FinancialSummaryTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn client(&self) -> Result<Client, HandlerError> {
        Client::builder()
            .timeout(Duration::from_millis(self.config.timeouts.http_ms))
            .build()
            .map_err(|e| HandlerError::Service(format!("failed to build HTTP client: {}", e)))
    }

    async fn get_json(&self, client: &Client, url: &str) -> Result<Value, HandlerError> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| HandlerError::Service(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HandlerError::Service(format!("{} returned {}: {}", url, status, body.trim())));
        }

        response
            .json()
            .await
            .map_err(|e| HandlerError::MalformedOutput(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl Handler for FinancialSummaryTool {
    fn name(&self) -> &'static str {
        "get_financial_summary"
    }

    fn description(&self) -> &'static str {
        "Account balances by type, net worth, and month-to-date income, expenses and savings."
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn execute(&self, params: &Value) -> Result<Value, HandlerError> {
        parse_params::<NoParams>(params)?;

        let base = self
            .config
            .financial
            .service_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .ok_or_else(|| HandlerError::Service("financial service-url is not configured".to_string()))?;

        let client = self.client()?;
        let accounts = parse_accounts(self.get_json(&client, &format!("{}/accounts", base)).await?)?;
        let balances = Balances::from_accounts(&accounts);

        let start = first_of_month(Local::now().date_naive()).format("%Y-%m-%d");
        let cashflow_url = format!("{}/cashflow?start_date={}", base, start);
        let cashflow = match self.get_json(&client, &cashflow_url).await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Cash flow unavailable, reporting zeros: {}", e);
                Value::Null
            }
        };
        let summary = &cashflow["summary"];
        let figure = |key: &str| summary[key].as_f64().unwrap_or(0.0);

        Ok(json!({
            "account_count": balances.account_count,
            "totals_by_type": balances.totals_by_type,
            "net_worth": balances.net_worth(),
            "mtd_income": figure("sumIncome"),
            "mtd_expenses": figure("sumExpense"),
            "mtd_savings": figure("savings"),
        }))
    }
}
