pub mod cluster_controller;
