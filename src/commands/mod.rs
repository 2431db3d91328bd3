pub mod prov;
