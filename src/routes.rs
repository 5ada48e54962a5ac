use chrono::Utc;
use rocket::Route;
use rocket::State;
use rocket::http::Status;
use rocket::serde::json::Json;
use uuid::Uuid;

use crate::analytics::{Conversion, FinancialRecord, SpendingReport, analyze};
use crate::auth::{GroupAuth, TokenKeys};
use crate::balance::{compute_balances, net_positions};
use crate::currency::RateTable;
use crate::db::GroupStore;
use crate::error::ApiError;
use crate::models::*;
use crate::summary::{GroupSummary, summarize};

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadId(raw.to_string()))
}

async fn load_group(store: &GroupStore, group_id: Uuid) -> Result<Group, ApiError> {
    store.load_group(group_id).await?.ok_or(ApiError::GroupNotFound)
}

// Health check
#[get("/health")]
fn health() -> &'static str {
    "OK"
}

// Create group - no auth required
#[post("/groups", data = "<request>")]
async fn create_group(
    store: &State<GroupStore>,
    keys: &State<TokenKeys>,
    request: Json<CreateGroupRequest>,
) -> Result<Json<GroupCreatedResponse>, ApiError> {
    let request = request.into_inner();
    let mut group = Group::new(request.name, request.base_currency.trim().to_ascii_uppercase());
    for name in &request.member_names {
        group.add_member(name)?;
    }

    store.insert_group(&group).await?;
    tracing::info!(group_id = %group.id, members = group.members.len(), "created group");

    let token = keys.issue(group.id)?;
    Ok(Json(GroupCreatedResponse { group, token }))
}

// Everything below requires a valid share token
#[get("/groups/current")]
async fn get_current_group(auth: GroupAuth, store: &State<GroupStore>) -> Result<Json<Group>, ApiError> {
    Ok(Json(load_group(store, auth.group_id).await?))
}

#[post("/groups/current/members", data = "<request>")]
async fn add_member(
    auth: GroupAuth,
    store: &State<GroupStore>,
    request: Json<AddMemberRequest>,
) -> Result<Json<Group>, ApiError> {
    let mut group = load_group(store, auth.group_id).await?;
    let member = group.add_member(&request.name)?.clone();

    store.insert_member(group.id, &member).await?;
    Ok(Json(group))
}

#[delete("/groups/current/members/<member_id>")]
async fn remove_member(
    auth: GroupAuth,
    store: &State<GroupStore>,
    member_id: &str,
) -> Result<Json<Group>, ApiError> {
    let member_id = parse_id(member_id)?;
    let mut group = load_group(store, auth.group_id).await?;
    if let Err(error) = group.remove_member(member_id) {
        tracing::warn!(group_id = %group.id, %member_id, %error, "refused to remove member");
        return Err(error.into());
    }

    store.delete_member(group.id, member_id).await?;
    Ok(Json(group))
}

#[get("/groups/current/expenses")]
async fn get_expenses(auth: GroupAuth, store: &State<GroupStore>) -> Result<Json<Vec<Expense>>, ApiError> {
    let group = load_group(store, auth.group_id).await?;
    Ok(Json(group.expenses))
}

#[post("/groups/current/expenses", data = "<request>")]
async fn create_expense(
    auth: GroupAuth,
    store: &State<GroupStore>,
    request: Json<ExpenseRequest>,
) -> Result<Json<Expense>, ApiError> {
    let mut group = load_group(store, auth.group_id).await?;
    let expense = request
        .into_inner()
        .into_expense(Uuid::new_v4(), &group.base_currency, Utc::now().date_naive());

    group.add_expense(expense.clone())?;
    store.insert_expense(group.id, &expense).await?;
    Ok(Json(expense))
}

#[put("/groups/current/expenses/<expense_id>", data = "<request>")]
async fn update_expense(
    auth: GroupAuth,
    store: &State<GroupStore>,
    expense_id: &str,
    request: Json<ExpenseRequest>,
) -> Result<Json<Expense>, ApiError> {
    let expense_id = parse_id(expense_id)?;
    let mut group = load_group(store, auth.group_id).await?;
    let expense = request
        .into_inner()
        .into_expense(expense_id, &group.base_currency, Utc::now().date_naive());

    group.replace_expense(expense.clone())?;
    store.update_expense(group.id, &expense).await?;
    Ok(Json(expense))
}

#[delete("/groups/current/expenses/<expense_id>")]
async fn delete_expense(
    auth: GroupAuth,
    store: &State<GroupStore>,
    expense_id: &str,
) -> Result<Status, ApiError> {
    let expense_id = parse_id(expense_id)?;
    let mut group = load_group(store, auth.group_id).await?;
    group.remove_expense(expense_id)?;

    store.delete_expense(group.id, expense_id).await?;
    Ok(Status::NoContent)
}

#[get("/groups/current/settlements")]
async fn get_settlements(
    auth: GroupAuth,
    store: &State<GroupStore>,
) -> Result<Json<Vec<Settlement>>, ApiError> {
    let group = load_group(store, auth.group_id).await?;
    Ok(Json(group.settlements))
}

#[post("/groups/current/settlements", data = "<request>")]
async fn create_settlement(
    auth: GroupAuth,
    store: &State<GroupStore>,
    request: Json<SettlementRequest>,
) -> Result<Json<Settlement>, ApiError> {
    let mut group = load_group(store, auth.group_id).await?;
    let settlement = request
        .into_inner()
        .into_settlement(Uuid::new_v4(), Utc::now().date_naive());

    group.add_settlement(settlement.clone())?;
    store.insert_settlement(group.id, &settlement).await?;
    Ok(Json(settlement))
}

#[delete("/groups/current/settlements/<settlement_id>")]
async fn delete_settlement(
    auth: GroupAuth,
    store: &State<GroupStore>,
    settlement_id: &str,
) -> Result<Status, ApiError> {
    let settlement_id = parse_id(settlement_id)?;
    let mut group = load_group(store, auth.group_id).await?;
    group.remove_settlement(settlement_id)?;

    store.delete_settlement(group.id, settlement_id).await?;
    Ok(Status::NoContent)
}

// Balances are recomputed from the stored history on every request
#[get("/groups/current/balances")]
async fn get_balances(auth: GroupAuth, store: &State<GroupStore>) -> Result<Json<Vec<Balance>>, ApiError> {
    let group = load_group(store, auth.group_id).await?;
    Ok(Json(compute_balances(&group)?))
}

#[get("/groups/current/positions")]
async fn get_positions(
    auth: GroupAuth,
    store: &State<GroupStore>,
) -> Result<Json<Vec<MemberPosition>>, ApiError> {
    let group = load_group(store, auth.group_id).await?;
    Ok(Json(net_positions(&group)?))
}

#[get("/groups/current/summary?<viewer>&<currency>")]
async fn get_summary(
    auth: GroupAuth,
    store: &State<GroupStore>,
    rates: &State<RateTable>,
    viewer: &str,
    currency: Option<&str>,
) -> Result<Json<GroupSummary>, ApiError> {
    let viewer = parse_id(viewer)?;
    let group = load_group(store, auth.group_id).await?;
    let display_currency = currency.unwrap_or(&group.base_currency);

    let summary = summarize(&group, viewer, |a, f, t| rates.convert(a, f, t), display_currency)?;
    Ok(Json(summary))
}

// Stateless: aggregates whatever records the dashboard posts
#[post("/analytics?<currency>&<default_currency>", data = "<records>")]
fn post_analytics(
    rates: &State<RateTable>,
    currency: Option<&str>,
    default_currency: Option<&str>,
    records: Json<Vec<FinancialRecord>>,
) -> Result<Json<SpendingReport>, ApiError> {
    let target = currency.unwrap_or(rates.base());
    let fallback = default_currency.unwrap_or(rates.base());
    let conversion = Conversion::new(|a, f, t| rates.convert(a, f, t), target, fallback);

    Ok(Json(analyze(&records, &conversion)?))
}

pub fn get_routes() -> Vec<Route> {
    routes![
        health,
        create_group,
        get_current_group,
        add_member,
        remove_member,
        get_expenses,
        create_expense,
        update_expense,
        delete_expense,
        get_settlements,
        create_settlement,
        delete_settlement,
        get_balances,
        get_positions,
        get_summary,
        post_analytics
    ]
}
