//! Function calling round trips against mocked vendor HTTP endpoints.

mod function_calling_e2e;
mod providers;
