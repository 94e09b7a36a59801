//! The module load hook.

use crate::{
    image::{MethodBody, ModuleImage},
    patch::patch_for_module,
    Result,
};

/// Inspects a module at load time and returns its patched image if targeted.
///
/// Non-targeted modules return `Ok(None)` without being parsed, so the hook
/// costs one string comparison on the hot path. Targeted modules are parsed,
/// the method of interest is rewritten and the whole image is re-encoded;
/// untouched methods round-trip byte-exactly.
///
/// A targeted module missing its method of interest also returns `Ok(None)` -
/// the host may load a stripped or older build, and patching nothing is safer
/// than failing its load.
///
/// # Errors
///
/// Fails when a targeted module's image or the targeted body is malformed,
/// or when the rewrite itself cannot be applied.
pub fn on_module_load(module_id: &str, image: &[u8]) -> Result<Option<Vec<u8>>> {
    let Some((method_name, patch)) = patch_for_module(module_id) else {
        return Ok(None);
    };

    log::debug!("Transforming module {}", module_id);

    let mut module = ModuleImage::parse(image)?;
    let Some(entry) = module.method_mut(method_name) else {
        log::debug!("Method {} not found in {}", method_name, module_id);
        return Ok(None);
    };

    let body = MethodBody::parse(&entry.body)?;
    let patched = patch.apply(&body)?;
    entry.body = patched.to_bytes()?;

    log::info!(
        "Patched {}::{} - {}",
        module_id,
        method_name,
        patch.description()
    );

    Ok(Some(module.to_bytes()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        image::MethodEntry,
        patch::{CERTIFICATE_UTIL_MODULE, VALIDATE_CERTIFICATE_BINDING},
    };

    fn certificate_util_image() -> Vec<u8> {
        let body = MethodBody::new(vec![0x01, 0x0A], 1); // ldc.i4.0, ret
        ModuleImage {
            methods: vec![
                MethodEntry {
                    name: VALIDATE_CERTIFICATE_BINDING.to_string(),
                    descriptor: "(Ljava/security/cert/Certificate;)Z".to_string(),
                    body: body.to_bytes().unwrap(),
                },
                MethodEntry {
                    name: "parseCertificate".to_string(),
                    descriptor: "([B)Ljava/security/cert/Certificate;".to_string(),
                    body: MethodBody::new(vec![0x0B], 1).to_bytes().unwrap(),
                },
            ],
        }
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn test_unknown_module_passes_through() {
        // Not even a parseable image; unknown modules are never touched
        let result = on_module_load("com/example/Other", &[0xDE, 0xAD]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_targeted_module_is_rewritten() {
        let image = certificate_util_image();
        let patched = on_module_load(CERTIFICATE_UTIL_MODULE, &image)
            .unwrap()
            .unwrap();
        assert_ne!(patched, image);

        let module = ModuleImage::parse(&patched).unwrap();
        let entry = module.method(VALIDATE_CERTIFICATE_BINDING).unwrap();
        let body = MethodBody::parse(&entry.body).unwrap();
        // Prologue: ldc.i4.1, ret; original code intact behind it
        assert_eq!(&body.code[..2], &[0x02, 0x0A]);
        assert_eq!(&body.code[2..], &[0x01, 0x0A]);

        // The sibling method round-trips byte-exactly
        let original = ModuleImage::parse(&image).unwrap();
        assert_eq!(
            module.method("parseCertificate").unwrap(),
            original.method("parseCertificate").unwrap()
        );
    }

    #[test]
    fn test_targeted_module_without_method_passes_through() {
        let image = ModuleImage {
            methods: vec![MethodEntry {
                name: "unrelated".to_string(),
                descriptor: "()V".to_string(),
                body: MethodBody::new(vec![0x0B], 1).to_bytes().unwrap(),
            }],
        }
        .to_bytes()
        .unwrap();

        let result = on_module_load(CERTIFICATE_UTIL_MODULE, &image).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_malformed_targeted_image_fails() {
        assert!(on_module_load(CERTIFICATE_UTIL_MODULE, &[0xDE, 0xAD]).is_err());
    }

    #[test]
    fn test_malformed_targeted_body_fails() {
        let image = ModuleImage {
            methods: vec![MethodEntry {
                name: VALIDATE_CERTIFICATE_BINDING.to_string(),
                descriptor: "(Ljava/security/cert/Certificate;)Z".to_string(),
                body: Vec::new(),
            }],
        }
        .to_bytes()
        .unwrap();

        assert!(on_module_load(CERTIFICATE_UTIL_MODULE, &image).is_err());
    }
}
