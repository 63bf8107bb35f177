//! WGSL kernels shipped with the crate, looked up by name.

/// Definitions shared by every kernel, prepended at compile time.
const PRELUDE: &str = include_str!("../../shaders/common.wgsl");

const SHADERS: &[(&str, &str)] = &[
    ("build_div", include_str!("../../shaders/build_div.wgsl")),
    ("build_matrix", include_str!("../../shaders/build_matrix.wgsl")),
    ("project", include_str!("../../shaders/project.wgsl")),
    ("incomplete_poisson", include_str!("../../shaders/incomplete_poisson.wgsl")),
    ("multiply_matrix", include_str!("../../shaders/multiply_matrix.wgsl")),
    ("residual", include_str!("../../shaders/residual.wgsl")),
    ("jacobi", include_str!("../../shaders/jacobi.wgsl")),
    ("vector_ops", include_str!("../../shaders/vector_ops.wgsl")),
    ("cg_alpha", include_str!("../../shaders/cg_alpha.wgsl")),
    ("cg_beta", include_str!("../../shaders/cg_beta.wgsl")),
    ("reduce", include_str!("../../shaders/reduce.wgsl")),
    ("reduce_vec4", include_str!("../../shaders/reduce_vec4.wgsl")),
    ("extrapolate", include_str!("../../shaders/extrapolate.wgsl")),
    ("constrain_velocity", include_str!("../../shaders/constrain_velocity.wgsl")),
    ("rigidbody_div", include_str!("../../shaders/rigidbody_div.wgsl")),
    ("rigidbody_pressure", include_str!("../../shaders/rigidbody_pressure.wgsl")),
    ("rigidbody_constrain", include_str!("../../shaders/rigidbody_constrain.wgsl")),
    ("shape", include_str!("../../shaders/shape.wgsl")),
    ("shape_velocity", include_str!("../../shaders/shape_velocity.wgsl")),
    ("union_phi", include_str!("../../shaders/union_phi.wgsl")),
];

pub(crate) fn find(name: &str) -> Option<(&'static str, &'static str)> {
    SHADERS.iter().copied().find(|(key, _)| *key == name)
}

pub(crate) fn with_prelude(body: &str) -> String {
    format!("{PRELUDE}\n{body}")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        for (i, (name, _)) in SHADERS.iter().enumerate() {
            assert!(
                SHADERS[i + 1..].iter().all(|(other, _)| other != name),
                "shader {name} registered twice"
            );
        }
    }

    #[test]
    fn test_every_kernel_has_an_entry_point() {
        for (name, body) in SHADERS {
            assert!(body.contains("@compute"), "{name} has no compute entry point");
        }
        assert!(find("project").is_some());
        assert!(find("no_such_kernel").is_none());
    }
}
