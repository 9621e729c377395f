use chrono::NaiveDateTime;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One physical store location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub store_id: String,
    pub state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub is_member: bool,
    pub card_on_file: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// One visit event. Foreign keys may be missing or dangling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub customer_id: Option<String>,
    pub store_id: Option<String>,
    pub visit_date: NaiveDateTime,
    pub order_total: f64,
    pub payment_method: Option<String>,
    pub card_on_file: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// A visit with its customer and store attributes denormalized alongside.
///
/// Customer and store fields are `None` when the foreign key has no match.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JoinedVisit {
    pub customer_id: Option<String>,
    pub store_id: Option<String>,
    pub visit_date: NaiveDateTime,
    pub order_total: f64,
    pub payment_method: Option<String>,
    pub card_on_file: Option<String>,
    pub is_member: Option<bool>,
    pub state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// The three source tables of one refresh cycle plus their joined view.
///
/// A dataset is never mutated after construction; each cycle builds a new one.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub stores: Vec<Store>,
    pub customers: Vec<Customer>,
    pub visits: Vec<Visit>,
    pub joined: Vec<JoinedVisit>,
}

impl Dataset {
    pub fn new(stores: Vec<Store>, customers: Vec<Customer>, visits: Vec<Visit>) -> Self {
        let joined = join_visits(&visits, &customers, &stores);
        Dataset {
            stores,
            customers,
            visits,
            joined,
        }
    }
}

/// Left outer join Visit ⋈ Customer ⋈ Store.
///
/// Produces exactly one row per visit. If a key repeats on the right side the
/// first row wins.
pub fn join_visits(visits: &[Visit], customers: &[Customer], stores: &[Store]) -> Vec<JoinedVisit> {
    let customers_by_id = index_first(customers.iter().map(|c| (c.customer_id.as_str(), c)), "customers");
    let stores_by_id = index_first(stores.iter().map(|s| (s.store_id.as_str(), s)), "stores");

    visits
        .iter()
        .map(|visit| {
            let customer = visit
                .customer_id
                .as_deref()
                .and_then(|id| customers_by_id.get(id).copied());
            let store = visit
                .store_id
                .as_deref()
                .and_then(|id| stores_by_id.get(id).copied());

            JoinedVisit {
                customer_id: visit.customer_id.clone(),
                store_id: visit.store_id.clone(),
                visit_date: visit.visit_date,
                order_total: visit.order_total,
                payment_method: visit.payment_method.clone(),
                card_on_file: visit
                    .card_on_file
                    .clone()
                    .or_else(|| customer.and_then(|c| c.card_on_file.clone())),
                is_member: customer.map(|c| c.is_member),
                state: store.and_then(|s| s.state.clone()),
                latitude: store.and_then(|s| s.latitude),
                longitude: store.and_then(|s| s.longitude),
            }
        })
        .collect()
}

fn index_first<'a, T>(
    rows: impl Iterator<Item = (&'a str, &'a T)>,
    table: &str,
) -> HashMap<&'a str, &'a T> {
    let mut index = HashMap::new();
    let mut duplicates = 0usize;
    for (key, row) in rows {
        if index.contains_key(key) {
            duplicates += 1;
        } else {
            index.insert(key, row);
        }
    }
    if duplicates > 0 {
        warn!("{} duplicate keys in `{}`; keeping first occurrence", duplicates, table);
    }
    index
}
