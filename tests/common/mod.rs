#![allow(dead_code)]

use std::fs;
use std::path::Path;

use foot_traffic::source::SourceDescriptor;

pub const STORES_CSV: &str = "\
store_id,state,latitude,longitude
007,CA,34.05,-118.24
S2,NY,40.71,-74.00
S3,CA,37.77,-122.42
";

pub const CUSTOMERS_CSV: &str = "\
customer_id,is_member
C1,true
C2,false
";

pub const VISITS_CSV: &str = "\
customer_id,store_id,visit_date,order_total,payment_method,card_on_file
C1,007,2024-01-01,100,credit,Visa
C2,S2,2024-01-03 12:30:00,40.5,cash,
C1,S3,2024-01-08,50,credit,Amex
C9,S9,2024-01-09,10,cash,
";

pub fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

/// Writes the three default CSV tables into `dir` and returns their descriptor.
pub fn csv_fixture(dir: &Path) -> SourceDescriptor {
    write(dir, "stores.csv", STORES_CSV);
    write(dir, "customers.csv", CUSTOMERS_CSV);
    write(dir, "visits.csv", VISITS_CSV);
    descriptor(dir)
}

pub fn descriptor(dir: &Path) -> SourceDescriptor {
    SourceDescriptor::csv(
        dir.join("stores.csv"),
        dir.join("customers.csv"),
        dir.join("visits.csv"),
    )
}

/// Creates a SQLite database with the three tables and the same rows as the
/// CSV fixture.
pub fn sqlite_fixture(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE stores (store_id TEXT, state TEXT, latitude REAL, longitude REAL);
         CREATE TABLE customers (customer_id TEXT, is_member INTEGER);
         CREATE TABLE visits (customer_id TEXT, store_id TEXT, visit_date TEXT,
                              order_total REAL, payment_method TEXT, card_on_file TEXT);
         INSERT INTO stores VALUES ('007', 'CA', 34.05, -118.24),
                                   ('S2', 'NY', 40.71, -74.0),
                                   ('S3', 'CA', 37.77, -122.42);
         INSERT INTO customers VALUES ('C1', 1), ('C2', 0);
         INSERT INTO visits VALUES ('C1', '007', '2024-01-01', 100, 'credit', 'Visa'),
                                   ('C2', 'S2', '2024-01-03 12:30:00', 40.5, 'cash', NULL),
                                   ('C1', 'S3', '2024-01-08', 50, 'credit', 'Amex'),
                                   ('C9', 'S9', '2024-01-09', 10, 'cash', NULL);",
    )
    .unwrap();
}
