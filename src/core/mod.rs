// ─── InterfaceOficial Engine Core ───
// Turns a version id into a ready-to-run launch spec.
//
// Architecture:
//   core/
//     version/      Version manifest, version documents, inheritance, OS rules
//     maven/        Coordinate parsing and version ordering
//     resolver      Library selection and deduplication for one context
//     downloader/   Content-addressed cache + concurrent verified downloads
//     assets/       Asset index + object layout
//     launch/       Classpath, natives, argument substitution
//     orchestrator  Resolve -> fetch -> compose state machine
//     context       Description of the target machine
//     auth/         Account identity fed into placeholders
//     config        Persisted engine settings
//     http          Injected fetcher + reqwest implementation

pub mod assets;
pub mod auth;
pub mod config;
pub mod context;
pub mod downloader;
pub mod error;
pub mod http;
pub mod launch;
pub mod maven;
pub mod orchestrator;
pub mod resolver;
pub mod version;
