use std::str::FromStr;

use beet::{Beet, ChainSelector, QuickConnection};
use serde_json::{Map, Value};

use super::identities::describe;
use crate::context::CommandContext;
use crate::error::{CliError, Result};

fn parse_selector(chain: &str) -> ChainSelector {
	match ChainSelector::from_str(chain) {
		Ok(selector) => selector,
		Err(never) => match never {},
	}
}

fn selectors(chains: &[String]) -> Vec<ChainSelector> {
	chains.iter().map(|chain| parse_selector(chain)).collect()
}

async fn open(ctx: &CommandContext, beet: &mut Beet, selectors: &[ChainSelector], force: bool) -> Result<QuickConnection> {
	beet.get_app(ctx.app.clone())?;
	Ok(beet.quick_connect(ctx.app.app_name(), selectors, force).await?)
}

async fn close_all(sessions: &QuickConnection) {
	for session in sessions.connections.values() {
		session.disconnect().await;
	}
}

pub async fn connect(ctx: &CommandContext, chains: &[String], force: bool) -> Result<()> {
	let mut beet = ctx.beet(ctx.store()?);
	let sessions = open(ctx, &mut beet, &selectors(chains), force).await?;

	let mut view = Map::new();
	for (selector, session) in &sessions.connections {
		let identity = session.identity().as_ref().map(describe).unwrap_or(Value::Null);
		view.insert(selector.clone(), identity);
	}
	close_all(&sessions).await;

	println!("{}", serde_json::to_string_pretty(&Value::Object(view))?);
	Ok(())
}

/// Parses `--params`; absent means an empty object.
pub(crate) fn parse_params(raw: Option<&str>) -> Result<Value> {
	let Some(raw) = raw else {
		return Ok(Value::Object(Map::new()));
	};
	let value: Value = serde_json::from_str(raw).map_err(|e| CliError::InvalidParams(e.to_string()))?;
	if !value.is_object() {
		return Err(CliError::InvalidParams("expected a JSON object".into()));
	}
	Ok(value)
}

pub async fn call(ctx: &CommandContext, method: &str, params: Option<&str>, chain: Option<&str>) -> Result<()> {
	let params = parse_params(params)?;
	let selector = chain.map_or(ChainSelector::Any, parse_selector);

	let mut beet = ctx.beet(ctx.store()?);
	let sessions = open(ctx, &mut beet, std::slice::from_ref(&selector), false).await?;
	let result = match sessions.get(selector.as_str()) {
		Some(session) => session.call(method, params).await,
		None => Err(beet::BeetError::usage("no session for the requested chain")),
	};
	close_all(&sessions).await;

	println!("{}", serde_json::to_string_pretty(&result?)?);
	Ok(())
}
