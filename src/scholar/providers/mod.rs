pub mod google_scholar;
