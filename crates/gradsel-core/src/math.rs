use nalgebra::Vector3;

pub type Real = f64;

pub type Vec3 = Vector3<Real>;
