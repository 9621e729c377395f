use chrono::{NaiveDate, NaiveDateTime};
use foot_traffic::metrics::{self, BucketWidth, CategoryCount, KpiSummary};
use foot_traffic::model::{Customer, Dataset, Store, Visit};
use std::collections::BTreeMap;

fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

fn store(id: &str, state: &str) -> Store {
    Store {
        store_id: id.to_string(),
        state: Some(state.to_string()),
        latitude: Some(36.0),
        longitude: Some(-119.0),
        extra: BTreeMap::new(),
    }
}

fn customer(id: &str, is_member: bool) -> Customer {
    Customer {
        customer_id: id.to_string(),
        is_member,
        card_on_file: None,
        extra: BTreeMap::new(),
    }
}

fn visit(customer: &str, store: &str, date: NaiveDateTime, total: f64, payment: &str) -> Visit {
    Visit {
        customer_id: Some(customer.to_string()),
        store_id: Some(store.to_string()),
        visit_date: date,
        order_total: total,
        payment_method: Some(payment.to_string()),
        card_on_file: None,
        extra: BTreeMap::new(),
    }
}

fn counts(pairs: &[(&str, usize)]) -> Vec<CategoryCount> {
    pairs
        .iter()
        .map(|(k, c)| CategoryCount {
            key: k.to_string(),
            count: *c,
        })
        .collect()
}

#[test]
fn two_visits_one_member() {
    let dataset = Dataset::new(
        vec![store("S1", "CA")],
        vec![customer("C1", true)],
        vec![
            visit("C1", "S1", at(2024, 1, 1), 100.0, "credit"),
            visit("C1", "S1", at(2024, 1, 8), 50.0, "cash"),
        ],
    );

    assert_eq!(metrics::total_visits(&dataset.visits), 2);
    assert_eq!(metrics::total_revenue_millions(&dataset.visits), 0.0);
    assert_eq!(
        metrics::payment_method_breakdown(&dataset.joined),
        counts(&[("cash", 1), ("credit", 1)])
    );

    let revenue = metrics::member_vs_nonmember_revenue(&dataset.joined, BucketWidth::WEEKLY);
    assert_eq!(revenue.len(), 2);
    assert_eq!(revenue[0].start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!((revenue[0].member, revenue[0].non_member), (100.0, 0.0));
    assert_eq!(revenue[1].start, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
    assert_eq!((revenue[1].member, revenue[1].non_member), (50.0, 0.0));
}

#[test]
fn empty_tables_give_zeroes() {
    let dataset = Dataset::new(Vec::new(), Vec::new(), Vec::new());
    let summary = KpiSummary::of(&dataset);

    assert_eq!(summary.active_customers, 0);
    assert_eq!(summary.total_visits, 0);
    assert_eq!(summary.total_revenue_millions, 0.0);
    assert!(metrics::visits_by_period(&dataset.visits, BucketWidth::WEEKLY).is_empty());
    assert!(metrics::store_count_by_state(&dataset.stores, 5).is_empty());
    assert!(metrics::visit_count_by_state(&dataset.joined, 5).is_empty());
    assert!(metrics::payment_method_breakdown(&dataset.joined).is_empty());
    assert!(metrics::card_provider_breakdown(&dataset.joined, 5).is_empty());
    assert!(metrics::member_vs_nonmember_revenue(&dataset.joined, BucketWidth::WEEKLY).is_empty());
    assert!(metrics::store_locations(&dataset.stores).is_empty());
}

#[test]
fn ties_break_alphabetically() {
    let stores = vec![
        store("1", "TX"),
        store("2", "CA"),
        store("3", "NY"),
        store("4", "TX"),
        store("5", "CA"),
        store("6", "WA"),
        store("7", "AZ"),
    ];

    assert_eq!(
        metrics::store_count_by_state(&stores, 3),
        counts(&[("CA", 2), ("TX", 2), ("AZ", 1)])
    );
    assert_eq!(metrics::store_count_by_state(&stores, 10).len(), 5);
}

#[test]
fn buckets_are_contiguous_and_total() {
    let visits = vec![
        visit("C1", "S1", at(2024, 3, 20), 1.0, "cash"),
        visit("C1", "S1", at(2024, 1, 1), 1.0, "cash"),
        visit("C1", "S1", at(2024, 1, 10), 1.0, "cash"),
        visit("C1", "S1", at(2024, 1, 11), 1.0, "cash"),
    ];

    for width in [BucketWidth::WEEKLY, BucketWidth::TEN_DAYS, BucketWidth::FORTNIGHTLY] {
        let buckets = metrics::visits_by_period(&visits, width);
        let total: usize = buckets.iter().map(|b| b.value).sum();
        assert_eq!(total, visits.len());

        let step = i64::from(width.in_days());
        for pair in buckets.windows(2) {
            assert_eq!((pair[1].start - pair[0].start).num_days(), step);
        }
        assert_eq!(buckets[0].start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(buckets.last().unwrap().value > 0);
    }

    let ten_days = metrics::visits_by_period(&visits, BucketWidth::TEN_DAYS);
    // Jan 10 is day 9 and still falls in the first ten-day bucket
    assert_eq!(ten_days[0].value, 2);
    assert_eq!(ten_days[1].value, 1);
    assert!(ten_days[2..ten_days.len() - 1].iter().all(|b| b.value == 0));
}

#[test]
fn revenue_split_matches_membership() {
    let dataset = Dataset::new(
        vec![store("S1", "CA")],
        vec![customer("M", true), customer("N", false)],
        vec![
            visit("M", "S1", at(2024, 1, 1), 10.0, "cash"),
            visit("N", "S1", at(2024, 1, 2), 20.0, "cash"),
            visit("N", "S1", at(2024, 1, 20), 5.0, "cash"),
            visit("ghost", "S1", at(2024, 2, 20), 99.0, "cash"),
        ],
    );

    let buckets = metrics::member_vs_nonmember_revenue(&dataset.joined, BucketWidth::WEEKLY);
    assert_eq!(buckets.len(), 3);
    assert_eq!((buckets[0].member, buckets[0].non_member), (10.0, 20.0));
    assert_eq!((buckets[1].member, buckets[1].non_member), (0.0, 0.0));
    assert_eq!((buckets[2].member, buckets[2].non_member), (0.0, 5.0));

    let member: f64 = buckets.iter().map(|b| b.member).sum();
    let non_member: f64 = buckets.iter().map(|b| b.non_member).sum();
    assert_eq!(member + non_member, 35.0);
}

#[test]
fn revenue_millions_never_decreases() {
    let mut visits = Vec::new();
    let mut previous = 0.0;
    for (i, total) in [250_000.0, 0.0, 49_999.0, 700_000.0, 1.0].into_iter().enumerate() {
        visits.push(visit("C1", "S1", at(2024, 1, 1 + i as u32), total, "cash"));
        let millions = metrics::total_revenue_millions(&visits);
        assert!(millions >= previous);
        previous = millions;
    }
    assert_eq!(previous, 1.0);
}

#[test]
fn card_provider_falls_back_to_customer() {
    let mut with_card = customer("C1", false);
    with_card.card_on_file = Some("Visa".to_string());
    let mut own_card = visit("C1", "S1", at(2024, 1, 2), 1.0, "credit");
    own_card.card_on_file = Some("Amex".to_string());

    let dataset = Dataset::new(
        vec![store("S1", "CA")],
        vec![with_card],
        vec![
            visit("C1", "S1", at(2024, 1, 1), 1.0, "credit"),
            own_card,
            visit("C2", "S1", at(2024, 1, 3), 1.0, "cash"),
        ],
    );

    assert_eq!(
        metrics::card_provider_breakdown(&dataset.joined, 5),
        counts(&[("Amex", 1), ("Visa", 1)])
    );
}

#[test]
fn deltas_against_baseline() {
    let base = Dataset::new(
        vec![store("S1", "CA")],
        vec![customer("C1", true)],
        vec![visit("C1", "S1", at(2024, 1, 1), 100.0, "cash")],
    );
    let grown = Dataset::new(
        base.stores.clone(),
        base.customers.clone(),
        vec![
            visit("C1", "S1", at(2024, 1, 1), 100.0, "cash"),
            visit("C1", "S1", at(2024, 1, 2), 25.4, "cash"),
        ],
    );

    let deltas = KpiSummary::of(&grown).deltas_since(&KpiSummary::of(&base));
    assert_eq!(deltas.visits, 1);
    assert_eq!(deltas.revenue, 25);
}

#[test]
fn revenue_ties_round_to_even() {
    let quarter = vec![visit("C1", "S1", at(2024, 1, 1), 250_000.0, "cash")];
    assert_eq!(metrics::total_revenue_millions(&quarter), 0.2);

    let more = vec![
        visit("C1", "S1", at(2024, 1, 1), 1_000_000.0, "cash"),
        visit("C1", "S1", at(2024, 1, 2), 250_000.0, "cash"),
    ];
    assert_eq!(metrics::total_revenue_millions(&more), 1.2);
    assert_eq!(metrics::format_revenue_millions(1.2), "$1.2M");

    let base = Dataset::new(Vec::new(), Vec::new(), vec![visit("C1", "S1", at(2024, 1, 1), 10.0, "cash")]);
    let grown = Dataset::new(
        Vec::new(),
        Vec::new(),
        vec![
            visit("C1", "S1", at(2024, 1, 1), 10.0, "cash"),
            visit("C1", "S1", at(2024, 1, 2), 2.5, "cash"),
        ],
    );
    assert_eq!(KpiSummary::of(&grown).deltas_since(&KpiSummary::of(&base)).revenue, 2);
}
