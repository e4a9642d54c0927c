pub mod hedge;
