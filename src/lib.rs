pub(crate) mod data {
    pub(crate) mod datasources {
        pub(crate) mod device_check_datasource;
        pub(crate) mod verify_receipt_datasource;
        mod utils;
    }
    pub(crate) mod models {
        pub(crate) mod verify_receipt {
            pub(crate) mod scalar;
            pub(crate) mod verify_receipt_request_model;
            pub(crate) mod verify_receipt_response_model;
        }
    }
    pub(crate) mod repositories {
        pub(crate) mod purchase_extractor;
        pub(crate) mod receipt_repository_impl;
        pub(crate) mod status_classifier;
    }
}

pub mod domain {
    pub mod entities {
        pub mod device_check_outcome;
        pub mod environment;
        pub mod purchase_record;
        pub mod validate_request;
    }
    pub mod repositories {
        pub mod receipt_repository;
    }
}

pub mod config;
pub mod errors;
pub mod status_codes;
pub mod util;

pub use config::{ConfigOverrides, VerifierConfig};
pub use data::datasources::{
    device_check_datasource::{CheckReceiptToolDatasource, DeviceCheckDatasource},
    verify_receipt_datasource::{
        VerifyReceiptDatasource, VerifyReceiptDatasourceImpl, VerifyReceiptRequestBody,
    },
};
pub use domain::entities::{
    environment::Environment,
    purchase_record::{ExtendedPurchaseInfo, PurchaseRecord},
    validate_request::{ExtractOptions, ValidateRequest},
};
pub use errors::{TransportError, TransportErrorKind, ValidationFailure, VerifyError};
pub use util::ReceiptVerifyUtil;
