mod allocation;
mod common;
mod eligibility;
mod import;
